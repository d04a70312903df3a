use std::future::Future;

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{
    coupon::{Coupon, CouponUsage},
    group_tour::GroupTour,
};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Record was modified concurrently")]
    Conflict,

    #[error("Record not found")]
    NotFound,

    #[error("Usage already recorded for this booking")]
    Duplicate,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persistence boundary for coupons.
///
/// Commits are optimistic: they succeed only if the stored version still
/// equals `expected_version`, otherwise they fail with `StoreError::Conflict`
/// and nothing is written.
pub trait CouponStore {
    fn load_coupon(&self, id: Uuid) -> impl Future<Output = Result<Coupon, StoreError>> + Send;

    fn find_coupon_by_code(
        &self,
        code: &str,
    ) -> impl Future<Output = Result<Coupon, StoreError>> + Send;

    /// Persists `redeemed`, which must be the loaded coupon with `usage`
    /// already recorded. Also fails with `Conflict` if the stored usage limit
    /// is already reached, and with `Duplicate` if the stored coupon already
    /// has a usage for the same booking. Returns the new version.
    fn commit_redemption(
        &self,
        redeemed: &Coupon,
        usage: &CouponUsage,
        expected_version: i32,
    ) -> impl Future<Output = Result<i32, StoreError>> + Send;

    /// Persists `released`, the loaded coupon with the usage for
    /// `booking_id` removed. Returns the new version.
    fn commit_release(
        &self,
        released: &Coupon,
        booking_id: Uuid,
        expected_version: i32,
    ) -> impl Future<Output = Result<i32, StoreError>> + Send;
}

/// Persistence boundary for group tours
pub trait TourStore {
    fn load_tour(&self, id: Uuid) -> impl Future<Output = Result<GroupTour, StoreError>> + Send;

    /// Persists membership, derived occupancy fields and status. Returns the
    /// new version.
    fn save_membership(
        &self,
        tour: &GroupTour,
        expected_version: i32,
    ) -> impl Future<Output = Result<i32, StoreError>> + Send;
}

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl CouponStore for PgStore {
    async fn load_coupon(&self, id: Uuid) -> Result<Coupon, StoreError> {
        Coupon::find_by_id(&self.pool, id)
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn find_coupon_by_code(&self, code: &str) -> Result<Coupon, StoreError> {
        Coupon::find_by_code(&self.pool, code)
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn commit_redemption(
        &self,
        redeemed: &Coupon,
        usage: &CouponUsage,
        expected_version: i32,
    ) -> Result<i32, StoreError> {
        Coupon::apply_redemption(&self.pool, redeemed.id, expected_version, usage)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate,
                other => StoreError::Database(other),
            })?
            .ok_or(StoreError::Conflict)
    }

    async fn commit_release(
        &self,
        released: &Coupon,
        booking_id: Uuid,
        expected_version: i32,
    ) -> Result<i32, StoreError> {
        Coupon::apply_release(&self.pool, released.id, expected_version, booking_id)
            .await?
            .ok_or(StoreError::Conflict)
    }
}

impl TourStore for PgStore {
    async fn load_tour(&self, id: Uuid) -> Result<GroupTour, StoreError> {
        GroupTour::find_by_id(&self.pool, id)
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn save_membership(
        &self,
        tour: &GroupTour,
        expected_version: i32,
    ) -> Result<i32, StoreError> {
        GroupTour::save_membership(&self.pool, tour, expected_version)
            .await?
            .ok_or(StoreError::Conflict)
    }
}
