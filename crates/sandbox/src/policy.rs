//! Statement policy filter
//!
//! This is a coarse lexical screen, not a SQL firewall. The statement is
//! trimmed, uppercased and whitespace-collapsed, then checked for any
//! deny-listed keyword as a plain substring. Consequences worth knowing:
//!
//! - a keyword inside a string literal, comment or longer word is still a
//!   match (`SELECT 'drop'`, `dropped_at`); those false positives are
//!   accepted in exchange for never having to parse SQL here;
//! - obfuscated DDL that never spells a deny-listed keyword (dynamic SQL
//!   inside a function body, for instance) is not caught.
//!
//! Tenant isolation and write discarding come from the executor's
//! rollback-only transaction, not from this filter. A parser-based check
//! can be layered above it if stronger guarantees are needed.

use querybox_config::{SandboxConfig, DEFAULT_DENY_LIST};
use serde::Serialize;

/// Outcome of classifying one statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum PolicyDecision {
    Permitted,
    Forbidden { keyword: String, reason: String },
}

impl PolicyDecision {
    pub fn is_permitted(&self) -> bool {
        matches!(self, PolicyDecision::Permitted)
    }

    /// Human-readable rejection reason
    pub fn reason(&self) -> Option<&str> {
        match self {
            PolicyDecision::Permitted => None,
            PolicyDecision::Forbidden { reason, .. } => Some(reason),
        }
    }
}

/// Keyword deny-list applied to every statement before execution
#[derive(Debug, Clone)]
pub struct StatementPolicy {
    deny_list: Vec<String>,
}

impl Default for StatementPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_DENY_LIST.iter().copied())
    }
}

impl StatementPolicy {
    pub fn new<I, K>(keywords: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let mut deny_list: Vec<String> = Vec::new();
        for keyword in keywords {
            let keyword = normalize(keyword.as_ref());
            if !keyword.is_empty() && !deny_list.contains(&keyword) {
                deny_list.push(keyword);
            }
        }
        Self { deny_list }
    }

    pub fn from_config(config: &SandboxConfig) -> Self {
        Self::new(&config.deny_list)
    }

    /// Add a keyword without touching call sites
    pub fn deny(mut self, keyword: &str) -> Self {
        let keyword = normalize(keyword);
        if !keyword.is_empty() && !self.deny_list.contains(&keyword) {
            self.deny_list.push(keyword);
        }
        self
    }

    pub fn deny_list(&self) -> &[String] {
        &self.deny_list
    }

    /// Classify a raw statement
    pub fn classify(&self, sql: &str) -> PolicyDecision {
        let statement = normalize(sql);

        match self
            .deny_list
            .iter()
            .find(|keyword| statement.contains(keyword.as_str()))
        {
            Some(keyword) => PolicyDecision::Forbidden {
                keyword: keyword.clone(),
                reason: format!("{} statements are not permitted in the sandbox", keyword),
            },
            None => PolicyDecision::Permitted,
        }
    }
}

/// Uppercase and collapse every whitespace run to one space, so
/// `create\n  schema` matches `CREATE SCHEMA`.
fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}
