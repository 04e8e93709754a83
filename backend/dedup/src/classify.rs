//! Keyword heuristics that label a question with a user role and a language
//! style.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Novice,
    Developer,
    Investor,
    Expert,
}

impl UserRole {
    pub const ALL: [UserRole; 4] = [
        UserRole::Novice,
        UserRole::Developer,
        UserRole::Investor,
        UserRole::Expert,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Novice => "novice",
            UserRole::Developer => "developer",
            UserRole::Investor => "investor",
            UserRole::Expert => "expert",
        }
    }

    /// Target share of all generated questions.
    pub fn target_ratio(self) -> f64 {
        match self {
            UserRole::Novice => 0.30,
            UserRole::Developer => 0.30,
            UserRole::Investor => 0.25,
            UserRole::Expert => 0.15,
        }
    }

    fn keywords(self) -> &'static [&'static str] {
        match self {
            UserRole::Novice => &["怎么看", "成功没", "有没有", "是什么", "不懂"],
            UserRole::Developer => &["批量", "api", "接口", "调试", "erc-20"],
            UserRole::Investor => &["持仓", "资产", "价格", "投资", "收益"],
            UserRole::Expert => &["分析", "对比", "挖掘", "复杂"],
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LanguageStyle {
    Technical,
    Colloquial,
    Malformed,
    Mixed,
}

impl LanguageStyle {
    pub const ALL: [LanguageStyle; 4] = [
        LanguageStyle::Technical,
        LanguageStyle::Colloquial,
        LanguageStyle::Malformed,
        LanguageStyle::Mixed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LanguageStyle::Technical => "technical",
            LanguageStyle::Colloquial => "colloquial",
            LanguageStyle::Malformed => "malformed",
            LanguageStyle::Mixed => "mixed",
        }
    }

    pub fn target_ratio(self) -> f64 {
        match self {
            LanguageStyle::Technical => 0.25,
            LanguageStyle::Colloquial => 0.35,
            LanguageStyle::Malformed => 0.15,
            LanguageStyle::Mixed => 0.25,
        }
    }
}

impl fmt::Display for LanguageStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First role whose keyword list matches the lowercased question; novice
/// otherwise.
pub fn infer_role(question: &str) -> UserRole {
    let lower = question.to_lowercase();
    UserRole::ALL
        .into_iter()
        .find(|role| role.keywords().iter().any(|kw| lower.contains(kw)))
        .unwrap_or(UserRole::Novice)
}

/// Style checks run in order: technical vocabulary, English terms inside CJK
/// text, truncated hex literals. Anything else is colloquial.
pub fn infer_style(question: &str) -> LanguageStyle {
    const TECHNICAL: [&str; 5] = ["ERC-20", "0x", "hash", "address", "token"];
    const ENGLISH_TERMS: [&str; 3] = ["address", "balance", "transaction"];

    if TECHNICAL.iter().any(|w| question.contains(w)) {
        return LanguageStyle::Technical;
    }
    let has_cjk = question.chars().any(|c| ('\u{4e00}'..='\u{9fff}').contains(&c));
    if has_cjk && ENGLISH_TERMS.iter().any(|w| question.contains(w)) {
        return LanguageStyle::Mixed;
    }
    let truncated_hex = question
        .split_whitespace()
        .any(|tok| tok.starts_with("0x") && tok.len() < 42);
    if truncated_hex {
        return LanguageStyle::Malformed;
    }
    LanguageStyle::Colloquial
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_follow_keyword_order() {
        assert_eq!(infer_role("这笔交易成功没？"), UserRole::Novice);
        assert_eq!(infer_role("How do I call the API in 批量 mode"), UserRole::Developer);
        assert_eq!(infer_role("我的持仓价值多少"), UserRole::Investor);
        assert_eq!(infer_role("帮我分析一下这个合约"), UserRole::Expert);
        assert_eq!(infer_role("最新区块"), UserRole::Novice);
        // Novice keywords win over expert ones.
        assert_eq!(infer_role("分析不懂"), UserRole::Novice);
    }

    #[test]
    fn styles() {
        assert_eq!(infer_style("get token info"), LanguageStyle::Technical);
        assert_eq!(infer_style("查一下balance"), LanguageStyle::Mixed);
        assert_eq!(infer_style("最新的区块是多少"), LanguageStyle::Colloquial);
    }

    #[test]
    fn ratios_sum_to_one() {
        let roles: f64 = UserRole::ALL.iter().map(|r| r.target_ratio()).sum();
        let styles: f64 = LanguageStyle::ALL.iter().map(|s| s.target_ratio()).sum();
        assert!((roles - 1.0).abs() < 1e-9);
        assert!((styles - 1.0).abs() < 1e-9);
    }
}
