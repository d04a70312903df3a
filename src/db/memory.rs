use std::collections::HashMap;

use tokio::sync::Mutex;
use uuid::Uuid;

use super::store::{CouponStore, StoreError, TourStore};
use crate::models::{
    coupon::{normalize_code, Coupon, CouponUsage},
    group_tour::GroupTour,
};

/// In-process store with the same version-checked commit rules as
/// `PgStore`. Each commit holds the map lock for its whole
/// check-and-write, so concurrent commits serialize.
#[derive(Default)]
pub struct MemoryStore {
    coupons: Mutex<HashMap<Uuid, Coupon>>,
    tours: Mutex<HashMap<Uuid, GroupTour>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_coupon(&self, coupon: Coupon) {
        self.coupons.lock().await.insert(coupon.id, coupon);
    }

    pub async fn insert_tour(&self, tour: GroupTour) {
        self.tours.lock().await.insert(tour.id, tour);
    }
}

impl CouponStore for MemoryStore {
    async fn load_coupon(&self, id: Uuid) -> Result<Coupon, StoreError> {
        self.coupons
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn find_coupon_by_code(&self, code: &str) -> Result<Coupon, StoreError> {
        let code = normalize_code(code);
        self.coupons
            .lock()
            .await
            .values()
            .find(|c| c.code == code)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn commit_redemption(
        &self,
        redeemed: &Coupon,
        usage: &CouponUsage,
        expected_version: i32,
    ) -> Result<i32, StoreError> {
        let mut coupons = self.coupons.lock().await;
        let stored = coupons.get_mut(&redeemed.id).ok_or(StoreError::NotFound)?;

        if stored.version != expected_version {
            return Err(StoreError::Conflict);
        }
        if stored
            .usage_limit
            .is_some_and(|limit| stored.used_count >= limit)
        {
            return Err(StoreError::Conflict);
        }
        if stored
            .used_by
            .iter()
            .any(|u| u.booking_id == usage.booking_id)
        {
            return Err(StoreError::Duplicate);
        }

        *stored = redeemed.clone();
        stored.version = expected_version + 1;

        Ok(stored.version)
    }

    async fn commit_release(
        &self,
        released: &Coupon,
        _booking_id: Uuid,
        expected_version: i32,
    ) -> Result<i32, StoreError> {
        let mut coupons = self.coupons.lock().await;
        let stored = coupons.get_mut(&released.id).ok_or(StoreError::NotFound)?;

        if stored.version != expected_version {
            return Err(StoreError::Conflict);
        }

        *stored = released.clone();
        stored.version = expected_version + 1;

        Ok(stored.version)
    }
}

impl TourStore for MemoryStore {
    async fn load_tour(&self, id: Uuid) -> Result<GroupTour, StoreError> {
        self.tours
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn save_membership(
        &self,
        tour: &GroupTour,
        expected_version: i32,
    ) -> Result<i32, StoreError> {
        let mut tours = self.tours.lock().await;
        let stored = tours.get_mut(&tour.id).ok_or(StoreError::NotFound)?;

        if stored.version != expected_version {
            return Err(StoreError::Conflict);
        }

        *stored = tour.clone();
        stored.version = expected_version + 1;

        Ok(stored.version)
    }
}
