//! Maps classifier labels to a moderation decision.
//!
//! The policy is an ordered rule list; the first rule whose predicate holds
//! decides. Matching is a case-insensitive substring search over all labels
//! joined together, so one label that mentions a keyword is enough.

use crate::models::moderation::{Decision, Reason, Status};

const UNSAFE_KEYWORDS: &[&str] = &["suggestive", "explicit", "violence", "gore", "weapon"];
const HUMAN_KEYWORDS: &[&str] = &["person", "human", "face", "people"];
const FOOD_KEYWORDS: &[&str] = &["food", "dish", "meal", "cuisine"];
const MOMO_KEYWORDS: &[&str] = &["dumpling", "momo", "dim sum", "wonton"];

/// When a rule fires relative to its keyword set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Match {
    /// At least one keyword occurs.
    Any,
    /// No keyword occurs.
    None,
}

/// One entry of the decision policy.
#[derive(Clone, Copy, Debug)]
pub struct Rule {
    pub name: &'static str,
    pub keywords: &'static [&'static str],
    pub fires_on: Match,
    pub outcome: Decision,
}

impl Rule {
    fn applies(&self, haystack: &str) -> bool {
        let hit = self.keywords.iter().any(|kw| haystack.contains(kw));
        match self.fires_on {
            Match::Any => hit,
            Match::None => !hit,
        }
    }
}

/// Decision policy in priority order. Safety checks come before anything
/// food-related.
pub const RULES: &[Rule] = &[
    Rule {
        name: "unsafe-content",
        keywords: UNSAFE_KEYWORDS,
        fires_on: Match::Any,
        outcome: Decision::new(Status::Blocked, Reason::UnsafeContent),
    },
    Rule {
        name: "human-detected",
        keywords: HUMAN_KEYWORDS,
        fires_on: Match::Any,
        outcome: Decision::new(Status::Blocked, Reason::HumanDetected),
    },
    Rule {
        name: "not-food",
        keywords: FOOD_KEYWORDS,
        fires_on: Match::None,
        outcome: Decision::new(Status::Blocked, Reason::NotFood),
    },
    Rule {
        name: "momo",
        keywords: MOMO_KEYWORDS,
        fires_on: Match::Any,
        outcome: Decision::new(Status::Approved, Reason::Momo),
    },
];

/// Applied when no rule fires: food, but not the one we want.
pub const FALLBACK: Decision = Decision::new(Status::Blurred, Reason::OtherFood);

/// Decide the moderation outcome for a label set. Total and pure.
pub fn decide<S: AsRef<str>>(labels: &[S]) -> Decision {
    let haystack = labels
        .iter()
        .map(|l| l.as_ref().to_lowercase())
        .collect::<Vec<_>>()
        .join("\n");

    RULES
        .iter()
        .find(|rule| rule.applies(&haystack))
        .map(|rule| rule.outcome)
        .unwrap_or(FALLBACK)
}
