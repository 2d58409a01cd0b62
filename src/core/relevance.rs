//! Relevance grade assigned to a candidate by the filter agent.

use serde::{Deserialize, Serialize};

/// How well a candidate matches the search intent, best first.
///
/// Discriminants are inverted (`High = 0`, `None = 3`) so the derived
/// [`Ord`] sorts the strongest matches first when ranking a result set.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Relevance {
    /// Directly matches the intent.
    High = 0,
    /// Matches part of the intent.
    #[default]
    Medium = 1,
    /// Tangential.
    Low = 2,
    /// Not a match.
    None = 3,
}

impl Relevance {
    /// Parses a grade (case-insensitive). Unknown grades yield `None`
    /// so that an unrecognised label never admits a candidate.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "high" | "strong" => Self::High,
            "medium" | "moderate" => Self::Medium,
            "low" | "weak" => Self::Low,
            _ => Self::None,
        }
    }

    /// Whether a candidate with this grade is kept in the curated set.
    #[must_use]
    pub const fn is_match(self) -> bool {
        !matches!(self, Self::None)
    }

    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::None => "none",
        }
    }
}

impl std::fmt::Display for Relevance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranking_order() {
        let mut grades = vec![Relevance::Low, Relevance::High, Relevance::Medium];
        grades.sort();
        assert_eq!(grades, vec![Relevance::High, Relevance::Medium, Relevance::Low]);
    }

    #[test]
    fn test_unknown_grade_is_excluded() {
        assert_eq!(Relevance::parse("MEDIUM"), Relevance::Medium);
        assert_eq!(Relevance::parse("maybe"), Relevance::None);
        assert!(!Relevance::parse("maybe").is_match());
        assert!(Relevance::Low.is_match());
    }
}
