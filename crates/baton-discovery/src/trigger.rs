//! Trigger normalization.
//!
//! Queries and triggers are compared in one normal form: lowercase, every
//! non-alphanumeric character replaced by a space, runs of whitespace
//! collapsed, ends trimmed.

use baton_contracts::capability::Trigger;

pub fn normalize(text: &str) -> String {
    let mapped: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .flat_map(char::to_lowercase)
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A trigger after normalization, computed once when a catalog is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedTrigger {
    pub phrase: String,
    pub tagged: bool,
    /// Normalized context tag. `None` for plain triggers and for tagged
    /// triggers without a context.
    pub context: Option<String>,
    /// The phrase as authored.
    pub original: String,
}

impl NormalizedTrigger {
    /// `None` when the phrase normalizes to nothing.
    pub fn new(trigger: &Trigger) -> Option<Self> {
        let phrase = normalize(trigger.phrase());
        if phrase.is_empty() {
            return None;
        }
        Some(Self {
            phrase,
            tagged: trigger.is_tagged(),
            context: trigger.context().map(normalize).filter(|c| !c.is_empty()),
            original: trigger.phrase().to_string(),
        })
    }
}
