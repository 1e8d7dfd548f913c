//! Coupons and their append-only usage ledger.

use crate::ids::{CouponId, OrderId, UserId};
use crate::membership::MembershipTier;
use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a coupon reduces the price.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CouponDiscount {
    /// Percent of the discount base (0..=100).
    Percentage(u32),
    /// Fixed amount.
    Fixed(Money),
}

/// A coupon definition, managed by the coupon administration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    /// Coupon id.
    pub id: CouponId,
    /// Code entered by the buyer.
    pub code: String,
    /// Discount rule.
    pub discount: CouponDiscount,
    /// Upper bound on the discount amount.
    pub max_discount: Option<Money>,
    /// Minimum order subtotal.
    pub min_order_amount: Option<Money>,
    /// Global redemption limit.
    pub usage_limit: Option<u32>,
    /// Redemptions allowed per user.
    pub per_user_limit: Option<u32>,
    /// Redemptions so far.
    pub used_count: u32,
    /// Tiers allowed to redeem. Empty means every tier.
    pub allowed_tiers: Vec<MembershipTier>,
    /// Start of validity.
    pub valid_from: Option<DateTime<Utc>>,
    /// End of validity.
    pub valid_until: Option<DateTime<Utc>>,
    /// Administrative switch.
    pub is_active: bool,
}

/// One redemption. Rows are only ever appended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponUsage {
    /// Redeemed coupon.
    pub coupon_id: CouponId,
    /// Redeeming user.
    pub user_id: UserId,
    /// Order the coupon was applied to.
    pub order_id: OrderId,
    /// Discount granted.
    pub discount_amount: Money,
    /// Commit time.
    pub used_at: DateTime<Utc>,
}

/// Why a coupon cannot be applied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CouponRejection {
    /// No coupon with this code.
    #[error("coupon not found")]
    NotFound,
    /// Disabled by an administrator.
    #[error("coupon is inactive")]
    Inactive,
    /// Validity has not started.
    #[error("coupon is valid from {valid_from}")]
    NotYetValid {
        /// Start of validity.
        valid_from: DateTime<Utc>,
    },
    /// Validity has ended.
    #[error("coupon expired at {valid_until}")]
    Expired {
        /// End of validity.
        valid_until: DateTime<Utc>,
    },
    /// Global limit reached.
    #[error("coupon usage limit of {limit} reached")]
    UsageExhausted {
        /// Global limit.
        limit: u32,
    },
    /// Per-user limit reached.
    #[error("coupon already used {limit} time(s) by this user")]
    PerUserLimitReached {
        /// Per-user limit.
        limit: u32,
    },
    /// Buyer's tier cannot redeem.
    #[error("coupon is restricted to tiers {allowed_tiers:?}")]
    TierIneligible {
        /// Tiers that may redeem.
        allowed_tiers: Vec<MembershipTier>,
    },
    /// Subtotal below the minimum.
    #[error("order subtotal {subtotal} is below the coupon minimum {minimum}")]
    BelowMinimum {
        /// Required subtotal.
        minimum: Money,
        /// Order subtotal.
        subtotal: Money,
    },
}

impl Coupon {
    /// Validates everything except usage counts against the given context.
    ///
    /// # Errors
    ///
    /// Returns the first failed rule.
    pub fn check_eligibility(
        &self,
        tier: MembershipTier,
        subtotal: Money,
        now: DateTime<Utc>,
    ) -> Result<(), CouponRejection> {
        if !self.is_active {
            return Err(CouponRejection::Inactive);
        }
        if let Some(valid_from) = self.valid_from.filter(|from| now < *from) {
            return Err(CouponRejection::NotYetValid { valid_from });
        }
        if let Some(valid_until) = self.valid_until.filter(|until| now > *until) {
            return Err(CouponRejection::Expired { valid_until });
        }
        if !self.allowed_tiers.is_empty() && !self.allowed_tiers.contains(&tier) {
            return Err(CouponRejection::TierIneligible {
                allowed_tiers: self.allowed_tiers.clone(),
            });
        }
        if let Some(minimum) = self.min_order_amount.filter(|min| subtotal < *min) {
            return Err(CouponRejection::BelowMinimum { minimum, subtotal });
        }
        Ok(())
    }

    /// Validates the global and per-user usage limits.
    ///
    /// # Errors
    ///
    /// Returns `UsageExhausted` or `PerUserLimitReached`.
    pub fn check_usage(&self, user_usage_count: u32) -> Result<(), CouponRejection> {
        if let Some(limit) = self.usage_limit.filter(|limit| self.used_count >= *limit) {
            return Err(CouponRejection::UsageExhausted { limit });
        }
        if let Some(limit) = self.per_user_limit.filter(|limit| user_usage_count >= *limit) {
            return Err(CouponRejection::PerUserLimitReached { limit });
        }
        Ok(())
    }

    /// Full validation: eligibility plus usage limits.
    ///
    /// # Errors
    ///
    /// Returns the first failed rule.
    pub fn validate(
        &self,
        tier: MembershipTier,
        subtotal: Money,
        user_usage_count: u32,
        now: DateTime<Utc>,
    ) -> Result<(), CouponRejection> {
        self.check_eligibility(tier, subtotal, now)?;
        self.check_usage(user_usage_count)
    }

    /// Discount granted against `base`, capped by `max_discount` and never above `base`.
    #[must_use]
    pub fn discount_for(&self, base: Money) -> Money {
        let raw = match self.discount {
            CouponDiscount::Percentage(percent) => {
                base.checked_percent(percent.min(100)).unwrap_or(base)
            }
            CouponDiscount::Fixed(amount) => amount,
        };
        let capped = self.max_discount.map_or(raw, |cap| raw.min(cap));
        capped.min(base)
    }
}
