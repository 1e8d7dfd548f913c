//! Membership tiers supplied by the external membership collaborator.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Membership tier of a buyer.
///
/// The tier drives three things: the queue priority score recorded on join, the
/// membership discount applied at checkout, and eligibility for early access.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipTier {
    /// No paid membership.
    Basic,
    /// Mid tier.
    Advanced,
    /// Top tier, eligible for early access.
    Premium,
}

impl MembershipTier {
    /// Highest priority score any tier can have.
    pub const MAX_PRIORITY_SCORE: i32 = 100;

    /// Queue priority score recorded on join.
    #[must_use]
    pub const fn priority_score(self) -> i32 {
        match self {
            Self::Premium => 100,
            Self::Advanced => 50,
            Self::Basic => 0,
        }
    }

    /// Membership discount in percent of the order subtotal.
    #[must_use]
    pub const fn discount_percent(self) -> u32 {
        match self {
            Self::Premium => 10,
            Self::Advanced => 5,
            Self::Basic => 0,
        }
    }

    /// Whether this tier may buy during a ticket type's early-access window.
    #[must_use]
    pub const fn has_early_access(self) -> bool {
        matches!(self, Self::Premium)
    }

    /// Database/string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Advanced => "advanced",
            Self::Premium => "premium",
        }
    }
}

impl fmt::Display for MembershipTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown tier name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown membership tier: {0}")]
pub struct UnknownTier(pub String);

impl FromStr for MembershipTier {
    type Err = UnknownTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(Self::Basic),
            "advanced" => Ok(Self::Advanced),
            "premium" => Ok(Self::Premium),
            other => Err(UnknownTier(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_and_discounts_follow_tier() {
        assert_eq!(MembershipTier::Premium.priority_score(), 100);
        assert_eq!(MembershipTier::Advanced.priority_score(), 50);
        assert_eq!(MembershipTier::Basic.priority_score(), 0);
        assert_eq!(MembershipTier::Premium.discount_percent(), 10);
        assert_eq!(MembershipTier::Advanced.discount_percent(), 5);
        assert_eq!(MembershipTier::Basic.discount_percent(), 0);
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("Premium".parse::<MembershipTier>(), Ok(MembershipTier::Premium));
        assert!("gold".parse::<MembershipTier>().is_err());
    }
}
