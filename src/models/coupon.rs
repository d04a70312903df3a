use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "discount_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    Hotel,
    Tour,
    Bus,
    Guide,
    All,
}

/// One redemption of a coupon. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CouponUsage {
    pub user_id: Uuid,
    pub booking_id: Uuid,
    pub used_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: Uuid,
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: f64,
    pub service_types: Vec<ServiceType>,
    pub min_purchase_amount: f64,
    pub max_discount_amount: Option<f64>, // None = uncapped
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub usage_limit: Option<i32>, // None = unlimited
    pub used_count: i32,
    pub is_active: bool,
    pub used_by: Vec<CouponUsage>,
    pub version: i32,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Listing view of a coupon. Carries the counter without the usage log, so
/// there is no `used_by` to disagree with `used_count`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouponSummary {
    pub id: Uuid,
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: f64,
    pub service_types: Vec<ServiceType>,
    pub min_purchase_amount: f64,
    pub max_discount_amount: Option<f64>,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub usage_limit: Option<i32>,
    pub used_count: i32,
    pub is_active: bool,
    pub version: i32,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct CouponRow {
    id: Uuid,
    code: String,
    description: Option<String>,
    discount_type: DiscountType,
    discount_value: f64,
    service_types: Json<Vec<ServiceType>>,
    min_purchase_amount: f64,
    max_discount_amount: Option<f64>,
    valid_from: DateTime<Utc>,
    valid_to: DateTime<Utc>,
    usage_limit: Option<i32>,
    used_count: i32,
    is_active: bool,
    version: i32,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CouponRow {
    fn into_coupon(self, used_by: Vec<CouponUsage>) -> Coupon {
        Coupon {
            id: self.id,
            code: self.code,
            description: self.description,
            discount_type: self.discount_type,
            discount_value: self.discount_value,
            service_types: self.service_types.0,
            min_purchase_amount: self.min_purchase_amount,
            max_discount_amount: self.max_discount_amount,
            valid_from: self.valid_from,
            valid_to: self.valid_to,
            usage_limit: self.usage_limit,
            used_count: self.used_count,
            is_active: self.is_active,
            used_by,
            version: self.version,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn into_summary(self) -> CouponSummary {
        CouponSummary {
            id: self.id,
            code: self.code,
            description: self.description,
            discount_type: self.discount_type,
            discount_value: self.discount_value,
            service_types: self.service_types.0,
            min_purchase_amount: self.min_purchase_amount,
            max_discount_amount: self.max_discount_amount,
            valid_from: self.valid_from,
            valid_to: self.valid_to,
            usage_limit: self.usage_limit,
            used_count: self.used_count,
            is_active: self.is_active,
            version: self.version,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCoupon {
    pub code: String,
    pub description: Option<String>,
    pub discount_type: Option<DiscountType>,
    pub discount_value: Option<f64>,
    #[serde(default)]
    pub service_types: Vec<ServiceType>,
    #[serde(default)]
    pub min_purchase_amount: f64,
    pub max_discount_amount: Option<f64>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
    pub usage_limit: Option<i32>,
}

/// Trims and upper-cases a coupon code so lookups are case-insensitive
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

impl Coupon {
    /// Inserts a coupon. Callers run validation first; missing required
    /// fields are reported as a protocol error here.
    pub async fn create(
        pool: &PgPool,
        data: NewCoupon,
        created_by: Uuid,
    ) -> Result<Self, sqlx::Error> {
        let (Some(discount_type), Some(discount_value), Some(valid_from), Some(valid_to)) = (
            data.discount_type,
            data.discount_value,
            data.valid_from,
            data.valid_to,
        ) else {
            return Err(sqlx::Error::Protocol(
                "coupon is missing required fields".to_string(),
            ));
        };

        let service_types = if data.service_types.is_empty() {
            vec![ServiceType::All]
        } else {
            data.service_types
        };

        let row = sqlx::query_as::<_, CouponRow>(
            r#"
            INSERT INTO coupons (
                code, description, discount_type, discount_value, service_types,
                min_purchase_amount, max_discount_amount, valid_from, valid_to,
                usage_limit, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(normalize_code(&data.code))
        .bind(&data.description)
        .bind(discount_type)
        .bind(discount_value)
        .bind(Json(service_types))
        .bind(data.min_purchase_amount)
        .bind(data.max_discount_amount)
        .bind(valid_from)
        .bind(valid_to)
        .bind(data.usage_limit)
        .bind(created_by)
        .fetch_one(pool)
        .await?;

        Ok(row.into_coupon(Vec::new()))
    }

    /// Finds a coupon and its usage log by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let row = sqlx::query_as::<_, CouponRow>(
            r#"
            SELECT * FROM coupons WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        match row {
            Some(row) => {
                let used_by = Self::load_usages(pool, row.id).await?;
                Ok(Some(row.into_coupon(used_by)))
            }
            None => Ok(None),
        }
    }

    /// Finds a coupon by code, normalizing the input first
    pub async fn find_by_code(pool: &PgPool, code: &str) -> Result<Option<Self>, sqlx::Error> {
        let row = sqlx::query_as::<_, CouponRow>(
            r#"
            SELECT * FROM coupons WHERE code = $1
            "#,
        )
        .bind(normalize_code(code))
        .fetch_optional(pool)
        .await?;

        match row {
            Some(row) => {
                let used_by = Self::load_usages(pool, row.id).await?;
                Ok(Some(row.into_coupon(used_by)))
            }
            None => Ok(None),
        }
    }

    /// Lists coupons for the admin dashboard. Usage logs are not loaded.
    pub async fn list(
        pool: &PgPool,
        active_only: bool,
    ) -> Result<Vec<CouponSummary>, sqlx::Error> {
        let query = if active_only {
            r#"
            SELECT * FROM coupons
            WHERE is_active = TRUE
            ORDER BY created_at DESC
            "#
        } else {
            r#"
            SELECT * FROM coupons
            ORDER BY created_at DESC
            "#
        };

        let rows = sqlx::query_as::<_, CouponRow>(query).fetch_all(pool).await?;

        Ok(rows.into_iter().map(CouponRow::into_summary).collect())
    }

    /// Soft-disables a coupon
    pub async fn deactivate(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE coupons
            SET is_active = FALSE, version = version + 1, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn load_usages(pool: &PgPool, coupon_id: Uuid) -> Result<Vec<CouponUsage>, sqlx::Error> {
        sqlx::query_as::<_, CouponUsage>(
            r#"
            SELECT user_id, booking_id, used_at FROM coupon_usages
            WHERE coupon_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(coupon_id)
        .fetch_all(pool)
        .await
    }

    /// Persists one redemption: bumps `used_count` and appends the usage row
    /// in a single transaction.
    ///
    /// Returns `Ok(None)` when the row changed since `expected_version` was
    /// read or the usage limit is already reached.
    pub async fn apply_redemption(
        pool: &PgPool,
        id: Uuid,
        expected_version: i32,
        usage: &CouponUsage,
    ) -> Result<Option<i32>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let new_version: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE coupons
            SET used_count = used_count + 1, version = version + 1, updated_at = NOW()
            WHERE id = $1
              AND version = $2
              AND (usage_limit IS NULL OR used_count < usage_limit)
            RETURNING version
            "#,
        )
        .bind(id)
        .bind(expected_version)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(new_version) = new_version else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query(
            r#"
            INSERT INTO coupon_usages (coupon_id, user_id, booking_id, used_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(id)
        .bind(usage.user_id)
        .bind(usage.booking_id)
        .bind(usage.used_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(new_version))
    }

    /// Compensating decrement for a booking that failed after redemption.
    ///
    /// Returns `Ok(None)` on a version conflict.
    pub async fn apply_release(
        pool: &PgPool,
        id: Uuid,
        expected_version: i32,
        booking_id: Uuid,
    ) -> Result<Option<i32>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let new_version: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE coupons
            SET used_count = used_count - 1, version = version + 1, updated_at = NOW()
            WHERE id = $1 AND version = $2 AND used_count > 0
            RETURNING version
            "#,
        )
        .bind(id)
        .bind(expected_version)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(new_version) = new_version else {
            tx.rollback().await?;
            return Ok(None);
        };

        let deleted = sqlx::query(
            r#"
            DELETE FROM coupon_usages
            WHERE coupon_id = $1 AND booking_id = $2
            "#,
        )
        .bind(id)
        .bind(booking_id)
        .execute(&mut *tx)
        .await?;

        if deleted.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(None);
        }

        tx.commit().await?;

        Ok(Some(new_version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(used_count: i32) -> CouponRow {
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        CouponRow {
            id: Uuid::new_v4(),
            code: "SUMMER20".to_string(),
            description: None,
            discount_type: DiscountType::Percentage,
            discount_value: 20.0,
            service_types: Json(vec![ServiceType::Hotel]),
            min_purchase_amount: 0.0,
            max_discount_amount: None,
            valid_from: at,
            valid_to: at,
            usage_limit: Some(10),
            used_count,
            is_active: true,
            version: used_count,
            created_by: Uuid::new_v4(),
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_listed_coupon_omits_usage_log() {
        let summary = row(3).into_summary();
        assert_eq!(summary.used_count, 3);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["used_count"], 3);
        assert!(json.get("used_by").is_none());
    }

    #[test]
    fn test_loaded_coupon_count_matches_log() {
        let usage = CouponUsage {
            user_id: Uuid::new_v4(),
            booking_id: Uuid::new_v4(),
            used_at: Utc::now(),
        };
        let coupon = row(1).into_coupon(vec![usage]);
        assert_eq!(coupon.used_count as usize, coupon.used_by.len());
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code("  summer20 "), "SUMMER20");
        assert_eq!(normalize_code("Bus-Deal"), "BUS-DEAL");
    }

    #[test]
    fn test_service_type_serialization() {
        let json = serde_json::to_string(&vec![ServiceType::Hotel, ServiceType::All]).unwrap();
        assert_eq!(json, r#"["hotel","all"]"#);
    }

    #[test]
    fn test_new_coupon_defaults() {
        let payload = r#"{
            "code": "welcome",
            "discount_type": "fixed",
            "discount_value": 500,
            "valid_from": "2025-01-01T00:00:00Z",
            "valid_to": "2025-12-31T23:59:59Z"
        }"#;
        let data: NewCoupon = serde_json::from_str(payload).unwrap();
        assert_eq!(data.discount_type, Some(DiscountType::Fixed));
        assert!(data.service_types.is_empty());
        assert_eq!(data.min_purchase_amount, 0.0);
        assert_eq!(data.usage_limit, None);
    }
}
