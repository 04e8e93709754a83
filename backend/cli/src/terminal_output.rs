//! Terminal output: status notes and plain-text tables for run reports.

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";

fn color_enabled() -> bool {
    std::env::var_os("NO_COLOR").is_none()
        && std::env::var("TERM").map(|t| t != "dumb").unwrap_or(false)
}

fn note(symbol: &str, color: &str, plain: &str, msg: &str) -> String {
    if color_enabled() {
        format!("{color}{BOLD}{symbol}{RESET} {msg}")
    } else {
        format!("{plain}: {msg}")
    }
}

pub fn note_info(msg: &str) {
    println!("{}", note("ℹ", CYAN, "INFO", msg));
}

pub fn note_warn(msg: &str) {
    println!("{}", note("⚠", YELLOW, "WARN", msg));
}

pub fn note_error(msg: &str) {
    eprintln!("{}", note("✗", RED, "ERROR", msg));
}

pub fn note_success(msg: &str) {
    println!("{}", note("✓", GREEN, "OK", msg));
}

/// Percentage with one decimal, `ratio` in `0.0..=1.0`.
pub fn percent(ratio: f64) -> String {
    format!("{:.1}%", ratio * 100.0)
}

fn is_numeric(cell: &str) -> bool {
    let digits = cell.trim_end_matches('%');
    !digits.is_empty() && digits.parse::<f64>().is_ok()
}

/// Render rows under `headers`. Columns after the first whose cells are all
/// numbers or percentages are right-aligned.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }
    let right: Vec<bool> = (0..widths.len())
        .map(|i| {
            i > 0
                && rows
                    .iter()
                    .all(|row| row.get(i).map_or(true, |c| c.is_empty() || is_numeric(c)))
        })
        .collect();

    let line = |cells: Vec<String>| -> String {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .zip(&right)
            .map(|((cell, &width), &right)| {
                if right {
                    format!("{cell:>width$}")
                } else {
                    format!("{cell:<width$}")
                }
            })
            .collect();
        format!("  {}\n", padded.join("  ").trim_end())
    };

    let mut out = line(headers.iter().map(|h| h.to_string()).collect());
    out.push_str(&line(widths.iter().map(|w| "-".repeat(*w)).collect()));
    for row in rows {
        let cells = (0..widths.len())
            .map(|i| row.get(i).cloned().unwrap_or_default())
            .collect();
        out.push_str(&line(cells));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_aligns_counters_right() {
        let rows = vec![
            vec!["get_balance".to_string(), "7".to_string()],
            vec!["get_block".to_string(), "42".to_string()],
        ];
        let table = render_table(&["Tool", "Calls"], &rows);
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[2], "  get_balance      7");
        assert_eq!(lines[3], "  get_block       42");
    }

    #[test]
    fn text_columns_stay_left_aligned() {
        let rows = vec![vec!["get_balance".to_string(), "Balance of".to_string()]];
        let table = render_table(&["Tool", "Description"], &rows);
        assert_eq!(table.lines().last().unwrap(), "  get_balance  Balance of");
    }

    #[test]
    fn short_rows_are_padded() {
        let table = render_table(&["a", "b"], &[vec!["x".to_string()]]);
        assert!(table.lines().last().unwrap().starts_with("  x"));
    }

    #[test]
    fn formats_percentages() {
        assert_eq!(percent(0.256), "25.6%");
        assert_eq!(percent(1.0), "100.0%");
    }
}
