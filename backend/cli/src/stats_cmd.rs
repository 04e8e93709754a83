//! `convoforge stats`: quota progress from the generation state file.

use anyhow::Result;

use convoforge_config::ForgeConfig;

use crate::terminal_output::{note_info, note_warn, percent, render_table};
use crate::wiring;

pub fn run(config: &ForgeConfig) -> Result<()> {
    let generation = config.generation();
    let tracker = wiring::open_tracker(&generation)?;
    let stats = tracker.statistics();

    println!(
        "\nGenerated {}/{} ({})\n",
        stats.total_generated,
        stats.total_target,
        percent(stats.completion_rate)
    );

    let rows: Vec<Vec<String>> = stats
        .categories
        .iter()
        .map(|c| {
            vec![
                c.category.clone(),
                c.generated.to_string(),
                c.target.to_string(),
                format!("{:.1}%", c.percent()),
            ]
        })
        .collect();
    print!("{}", render_table(&["Category", "Generated", "Target", "Done"], &rows));

    let distribution = |counts: &std::collections::BTreeMap<String, u64>,
                        targets: &std::collections::BTreeMap<String, f64>| {
        let total: u64 = counts.values().sum();
        targets
            .iter()
            .map(|(key, target)| {
                let count = counts.get(key).copied().unwrap_or(0);
                let share = if total == 0 { 0.0 } else { count as f64 / total as f64 };
                vec![key.clone(), count.to_string(), percent(share), percent(*target)]
            })
            .collect::<Vec<_>>()
    };
    println!();
    print!(
        "{}",
        render_table(
            &["Role", "Count", "Share", "Target"],
            &distribution(&stats.roles, &stats.role_targets)
        )
    );
    println!();
    print!(
        "{}",
        render_table(
            &["Style", "Count", "Share", "Target"],
            &distribution(&stats.styles, &stats.style_targets)
        )
    );

    println!(
        "\nUsed: {} question signatures, {} addresses, {} tx hashes\n",
        stats.used_signatures, stats.used_addresses, stats.used_tx_hashes
    );

    let lagging = tracker.lagging_categories();
    if !lagging.is_empty() {
        note_warn(&format!("Lagging categories: {}", lagging.join(", ")));
    }

    let allocation = tracker.priority_allocation(generation.batch_size() as u64);
    if allocation.is_empty() {
        note_info("All category quotas are met");
    } else {
        let next: Vec<String> = allocation
            .iter()
            .map(|a| format!("{}={}", a.category, a.count))
            .collect();
        note_info(&format!("Next batch: {}", next.join(", ")));
    }
    Ok(())
}
