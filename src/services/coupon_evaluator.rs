use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::db::store::{CouponStore, StoreError};
use crate::models::coupon::{Coupon, CouponUsage, DiscountType, ServiceType};

#[derive(thiserror::Error, Debug)]
pub enum RedemptionError {
    #[error("Coupon not found")]
    NotFound,

    #[error("Coupon is not valid: {0}")]
    Invalid(InvalidReason),

    #[error("Coupon was redeemed concurrently, re-validate and retry")]
    Conflict,

    #[error("Coupon already redeemed for booking {0}")]
    AlreadyRedeemed(Uuid),

    #[error("No redemption recorded for booking {0}")]
    UsageNotFound(Uuid),

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for RedemptionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => RedemptionError::Conflict,
            StoreError::NotFound => RedemptionError::NotFound,
            other => RedemptionError::Store(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    Inactive,
    NotYetValid,
    Expired,
    UsageLimitReached,
}

impl InvalidReason {
    pub fn as_str(self) -> &'static str {
        match self {
            InvalidReason::Inactive => "inactive",
            InvalidReason::NotYetValid => "not yet valid",
            InvalidReason::Expired => "expired",
            InvalidReason::UsageLimitReached => "usage limit reached",
        }
    }
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouponValidity {
    Valid,
    Invalid(InvalidReason),
}

impl CouponValidity {
    pub fn is_valid(&self) -> bool {
        matches!(self, CouponValidity::Valid)
    }

    pub fn reason(&self) -> Option<InvalidReason> {
        match self {
            CouponValidity::Valid => None,
            CouponValidity::Invalid(reason) => Some(*reason),
        }
    }
}

pub const MINIMUM_PURCHASE_NOT_MET: &str = "minimum purchase not met";
pub const NOT_APPLICABLE_TO_SERVICE: &str = "not applicable to service";

/// Discount for a purchase, in whole currency units
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscountOutcome {
    pub discount: i64,
    pub final_amount: i64,
    pub reason: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CouponQuote {
    pub code: String,
    pub applicable: bool,
    pub reason: Option<&'static str>,
    pub amount: i64,
    pub discount: i64,
    pub final_amount: i64,
}

/// Checks the coupon's own state at `now`.
///
/// The first failing check decides the reason. Window boundaries are valid.
pub fn check_validity(coupon: &Coupon, now: DateTime<Utc>) -> CouponValidity {
    if !coupon.is_active {
        return CouponValidity::Invalid(InvalidReason::Inactive);
    }
    if now < coupon.valid_from {
        return CouponValidity::Invalid(InvalidReason::NotYetValid);
    }
    if now > coupon.valid_to {
        return CouponValidity::Invalid(InvalidReason::Expired);
    }
    if let Some(limit) = coupon.usage_limit {
        if coupon.used_count >= limit {
            return CouponValidity::Invalid(InvalidReason::UsageLimitReached);
        }
    }

    CouponValidity::Valid
}

/// Computes the discount for `amount` without checking validity.
///
/// `discount` and `final_amount` are rounded independently from the
/// unrounded discount.
pub fn compute_discount(coupon: &Coupon, amount: i64) -> DiscountOutcome {
    let amount_f = amount as f64;

    if amount_f < coupon.min_purchase_amount {
        return DiscountOutcome {
            discount: 0,
            final_amount: amount,
            reason: Some(MINIMUM_PURCHASE_NOT_MET),
        };
    }

    let raw = match coupon.discount_type {
        DiscountType::Percentage => {
            let raw = amount_f * coupon.discount_value / 100.0;
            match coupon.max_discount_amount {
                Some(cap) => raw.min(cap),
                None => raw,
            }
        }
        DiscountType::Fixed => coupon.discount_value,
    };

    let discount = raw.min(amount_f).max(0.0);

    DiscountOutcome {
        discount: discount.round() as i64,
        final_amount: (amount_f - discount).round() as i64,
        reason: None,
    }
}

pub fn applies_to(coupon: &Coupon, service: ServiceType) -> bool {
    coupon
        .service_types
        .iter()
        .any(|s| *s == ServiceType::All || *s == service)
}

/// Validity, then applicability, then discount, as shown at checkout
pub fn quote(
    coupon: &Coupon,
    service: ServiceType,
    amount: i64,
    now: DateTime<Utc>,
) -> CouponQuote {
    let rejected = |reason: &'static str| CouponQuote {
        code: coupon.code.clone(),
        applicable: false,
        reason: Some(reason),
        amount,
        discount: 0,
        final_amount: amount,
    };

    if let CouponValidity::Invalid(reason) = check_validity(coupon, now) {
        return rejected(reason.as_str());
    }
    if !applies_to(coupon, service) {
        return rejected(NOT_APPLICABLE_TO_SERVICE);
    }

    let outcome = compute_discount(coupon, amount);
    CouponQuote {
        code: coupon.code.clone(),
        applicable: outcome.reason.is_none(),
        reason: outcome.reason,
        amount,
        discount: outcome.discount,
        final_amount: outcome.final_amount,
    }
}

/// Appends a usage entry and bumps `used_count` together.
///
/// Only call after payment is confirmed. Returns the appended entry.
pub fn record_usage(
    coupon: &mut Coupon,
    user_id: Uuid,
    booking_id: Uuid,
    now: DateTime<Utc>,
) -> CouponUsage {
    let usage = CouponUsage {
        user_id,
        booking_id,
        used_at: now,
    };
    coupon.used_by.push(usage.clone());
    coupon.used_count += 1;
    usage
}

/// Reverses `record_usage` for one booking
pub fn release_usage(coupon: &mut Coupon, booking_id: Uuid) -> Option<CouponUsage> {
    let index = coupon
        .used_by
        .iter()
        .position(|u| u.booking_id == booking_id)?;
    let usage = coupon.used_by.remove(index);
    coupon.used_count -= 1;
    Some(usage)
}

/// Redeems a coupon for a paid booking.
///
/// Fails with `RedemptionError::Conflict` if another redemption committed
/// between load and commit. The caller decides whether to re-validate and
/// retry or report the coupon as exhausted.
#[tracing::instrument(skip(store))]
pub async fn redeem<S: CouponStore>(
    store: &S,
    code: &str,
    user_id: Uuid,
    booking_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Coupon, RedemptionError> {
    let mut coupon = store.find_coupon_by_code(code).await?;
    let expected_version = coupon.version;

    if let CouponValidity::Invalid(reason) = check_validity(&coupon, now) {
        tracing::info!(coupon_id = %coupon.id, reason = %reason, "Coupon rejected at redemption");
        return Err(RedemptionError::Invalid(reason));
    }

    if coupon.used_by.iter().any(|u| u.booking_id == booking_id) {
        return Err(RedemptionError::AlreadyRedeemed(booking_id));
    }

    let usage = record_usage(&mut coupon, user_id, booking_id, now);

    match store
        .commit_redemption(&coupon, &usage, expected_version)
        .await
    {
        Ok(version) => {
            coupon.version = version;
            tracing::info!(
                coupon_id = %coupon.id,
                used_count = coupon.used_count,
                "Coupon redeemed"
            );
            Ok(coupon)
        }
        Err(StoreError::Conflict) => {
            tracing::warn!(coupon_id = %coupon.id, "Coupon redemption lost a concurrent race");
            Err(RedemptionError::Conflict)
        }
        Err(StoreError::Duplicate) => Err(RedemptionError::AlreadyRedeemed(booking_id)),
        Err(e) => Err(e.into()),
    }
}

/// Compensates a redemption whose booking later failed
#[tracing::instrument(skip(store))]
pub async fn release<S: CouponStore>(
    store: &S,
    code: &str,
    booking_id: Uuid,
) -> Result<Coupon, RedemptionError> {
    let mut coupon = store.find_coupon_by_code(code).await?;
    let expected_version = coupon.version;

    release_usage(&mut coupon, booking_id).ok_or(RedemptionError::UsageNotFound(booking_id))?;

    coupon.version = store
        .commit_release(&coupon, booking_id, expected_version)
        .await?;

    tracing::info!(
        coupon_id = %coupon.id,
        used_count = coupon.used_count,
        "Coupon redemption released"
    );

    Ok(coupon)
}
