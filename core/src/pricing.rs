//! Order pricing.
//!
//! ```text
//! subtotal            = Σ unit_price × quantity
//! membership_discount = tier% × subtotal
//! coupon_discount     = coupon(subtotal − membership_discount), capped
//! vat                 = vat% × (subtotal − membership_discount − coupon_discount)
//! total               = subtotal − discounts + vat
//! ```
//!
//! Every percentage rounds down to whole cents.

use crate::coupon::Coupon;
use crate::membership::MembershipTier;
use crate::money::Money;
use serde::{Deserialize, Serialize};

/// Default VAT rate in percent.
pub const DEFAULT_VAT_PERCENT: u32 = 10;

/// Arithmetic overflow while pricing an order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("order amount overflow")]
pub struct PricingOverflow;

/// Price components of an order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    /// Sum of line totals.
    pub subtotal: Money,
    /// Tier discount.
    pub membership_discount: Money,
    /// Coupon discount.
    pub coupon_discount: Money,
    /// Tax on the discounted amount.
    pub vat: Money,
    /// Amount to pay.
    pub total: Money,
}

/// Sum of `unit_price × quantity` over the lines.
///
/// # Errors
///
/// Returns [`PricingOverflow`] if the sum does not fit.
pub fn subtotal<I>(lines: I) -> Result<Money, PricingOverflow>
where
    I: IntoIterator<Item = (Money, u32)>,
{
    lines.into_iter().try_fold(Money::ZERO, |acc, (price, quantity)| {
        price
            .checked_multiply(quantity)
            .and_then(|line| acc.checked_add(line))
            .ok_or(PricingOverflow)
    })
}

impl PriceBreakdown {
    /// Prices an order from its subtotal.
    ///
    /// The coupon must already have been validated; it only contributes its discount here.
    ///
    /// # Errors
    ///
    /// Returns [`PricingOverflow`] on arithmetic overflow.
    pub fn compute(
        subtotal: Money,
        tier: MembershipTier,
        coupon: Option<&Coupon>,
        vat_percent: u32,
    ) -> Result<Self, PricingOverflow> {
        let membership_discount = subtotal
            .checked_percent(tier.discount_percent())
            .ok_or(PricingOverflow)?;
        let after_membership = subtotal.saturating_sub(membership_discount);
        let coupon_discount = coupon.map_or(Money::ZERO, |c| c.discount_for(after_membership));
        let taxable = after_membership.saturating_sub(coupon_discount);
        let vat = taxable.checked_percent(vat_percent).ok_or(PricingOverflow)?;
        let total = taxable.checked_add(vat).ok_or(PricingOverflow)?;

        Ok(Self {
            subtotal,
            membership_discount,
            coupon_discount,
            vat,
            total,
        })
    }

    /// Membership plus coupon discount.
    #[must_use]
    pub const fn total_discount(&self) -> Money {
        Money::from_cents(
            self.membership_discount
                .cents()
                .saturating_add(self.coupon_discount.cents()),
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::coupon::CouponDiscount;
    use crate::ids::CouponId;
    use proptest::prelude::*;

    fn percent_coupon(percent: u32, cap: Option<u64>) -> Coupon {
        Coupon {
            id: CouponId::new(),
            code: "TEST".to_string(),
            discount: CouponDiscount::Percentage(percent),
            max_discount: cap.map(Money::from_cents),
            min_order_amount: None,
            usage_limit: None,
            per_user_limit: None,
            used_count: 0,
            allowed_tiers: Vec::new(),
            valid_from: None,
            valid_until: None,
            is_active: true,
        }
    }

    #[test]
    fn premium_with_coupon() {
        // 2 x 100.00 = 200.00; premium 10% = 20.00; coupon 10% of 180.00 = 18.00;
        // vat 10% of 162.00 = 16.20; total 178.20
        let sub = subtotal([(Money::from_cents(10_000), 2)]).unwrap();
        let coupon = percent_coupon(10, None);
        let price =
            PriceBreakdown::compute(sub, MembershipTier::Premium, Some(&coupon), DEFAULT_VAT_PERCENT)
                .unwrap();

        assert_eq!(price.subtotal, Money::from_cents(20_000));
        assert_eq!(price.membership_discount, Money::from_cents(2_000));
        assert_eq!(price.coupon_discount, Money::from_cents(1_800));
        assert_eq!(price.vat, Money::from_cents(1_620));
        assert_eq!(price.total, Money::from_cents(17_820));
    }

    #[test]
    fn basic_without_coupon_only_adds_vat() {
        let price =
            PriceBreakdown::compute(Money::from_cents(5_005), MembershipTier::Basic, None, 10)
                .unwrap();
        assert_eq!(price.membership_discount, Money::ZERO);
        assert_eq!(price.vat, Money::from_cents(500));
        assert_eq!(price.total, Money::from_cents(5_505));
    }

    #[test]
    fn subtotal_overflow_is_reported() {
        assert_eq!(subtotal([(Money::from_cents(u64::MAX), 2)]), Err(PricingOverflow));
    }

    proptest! {
        #[test]
        fn discounts_never_exceed_subtotal(
            cents in 0u64..1_000_000_000,
            percent in 0u32..=100,
            cap in proptest::option::of(0u64..1_000_000),
            tier in prop_oneof![
                Just(MembershipTier::Basic),
                Just(MembershipTier::Advanced),
                Just(MembershipTier::Premium),
            ],
        ) {
            let sub = Money::from_cents(cents);
            let coupon = percent_coupon(percent, cap);
            let price = PriceBreakdown::compute(sub, tier, Some(&coupon), DEFAULT_VAT_PERCENT).unwrap();

            prop_assert!(price.total_discount() <= price.subtotal);
            let taxable = price.subtotal.saturating_sub(price.total_discount());
            prop_assert_eq!(price.total.cents(), taxable.cents() + price.vat.cents());
            prop_assert!(price.vat <= taxable);
        }
    }
}
