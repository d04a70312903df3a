use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use uuid::Uuid;

use crate::api::middleware::{
    auth::{get_authenticated_user, require_auth},
    session::AppState,
};
use crate::db::CouponStore;
use crate::error::{AppError, Result};
use crate::models::coupon::{Coupon, CouponSummary, NewCoupon, ServiceType};
use crate::models::validation::validate_new_coupon;
use crate::services::coupon_evaluator::{self, CouponQuote};

#[derive(Debug, Deserialize)]
pub struct ListCouponsQuery {
    pub active_only: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ValidateCouponRequest {
    pub code: String,
    pub service_type: ServiceType,
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct RedemptionRequest {
    pub code: String,
    pub booking_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct RedemptionResponse {
    pub coupon_id: Uuid,
    pub code: String,
    pub booking_id: Uuid,
    pub used_count: i32,
    pub usage_limit: Option<i32>,
}

impl RedemptionResponse {
    fn new(coupon: &Coupon, booking_id: Uuid) -> Self {
        Self {
            coupon_id: coupon.id,
            code: coupon.code.clone(),
            booking_id,
            used_count: coupon.used_count,
            usage_limit: coupon.usage_limit,
        }
    }
}

/// Create coupon (admin)
async fn create_coupon(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<NewCoupon>,
) -> Result<(StatusCode, Json<Coupon>)> {
    let user = get_authenticated_user(&session).await?;
    user.require_admin()?;

    let errors = validate_new_coupon(&req);
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let coupon = Coupon::create(&state.pool, req, user.user_id)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict("Coupon code already exists".to_string())
            }
            other => AppError::Database(other),
        })?;

    tracing::info!(coupon_id = %coupon.id, code = %coupon.code, "Coupon created");

    Ok((StatusCode::CREATED, Json(coupon)))
}

/// List coupons (admin)
async fn list_coupons(
    State(state): State<AppState>,
    session: Session,
    Query(params): Query<ListCouponsQuery>,
) -> Result<Json<Vec<CouponSummary>>> {
    get_authenticated_user(&session).await?.require_admin()?;

    let coupons = Coupon::list(&state.pool, params.active_only.unwrap_or(false)).await?;

    Ok(Json(coupons))
}

/// Deactivate coupon (admin). Coupons are never deleted.
async fn deactivate_coupon(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    get_authenticated_user(&session).await?.require_admin()?;

    if !Coupon::deactivate(&state.pool, id).await? {
        return Err(AppError::NotFound("Coupon not found".to_string()));
    }

    tracing::info!(coupon_id = %id, "Coupon deactivated");

    Ok(StatusCode::NO_CONTENT)
}

/// Quote a coupon against a purchase at checkout. Records nothing.
async fn validate_coupon(
    State(state): State<AppState>,
    Json(req): Json<ValidateCouponRequest>,
) -> Result<Json<CouponQuote>> {
    if req.amount < 0 {
        return Err(AppError::BadRequest("amount must not be negative".to_string()));
    }

    let coupon = state.store.find_coupon_by_code(&req.code).await?;
    let quote = coupon_evaluator::quote(&coupon, req.service_type, req.amount, Utc::now());

    tracing::debug!(
        code = %quote.code,
        applicable = quote.applicable,
        reason = ?quote.reason,
        "Coupon quoted"
    );

    Ok(Json(quote))
}

/// Record a redemption once the booking is paid
async fn redeem_coupon(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<RedemptionRequest>,
) -> Result<Json<RedemptionResponse>> {
    let user = get_authenticated_user(&session).await?;

    let coupon = coupon_evaluator::redeem(
        &state.store,
        &req.code,
        user.user_id,
        req.booking_id,
        Utc::now(),
    )
    .await?;

    Ok(Json(RedemptionResponse::new(&coupon, req.booking_id)))
}

/// Undo a redemption for a booking that failed after payment (admin)
async fn release_coupon(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<RedemptionRequest>,
) -> Result<Json<RedemptionResponse>> {
    get_authenticated_user(&session).await?.require_admin()?;

    let coupon = coupon_evaluator::release(&state.store, &req.code, req.booking_id).await?;

    Ok(Json(RedemptionResponse::new(&coupon, req.booking_id)))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/coupons", get(list_coupons).post(create_coupon))
        .route("/api/coupons/:id", delete(deactivate_coupon))
        .route("/api/coupons/validate", post(validate_coupon))
        .route("/api/coupons/redeem", post(redeem_coupon))
        .route("/api/coupons/release", post(release_coupon))
        .route_layer(middleware::from_fn(require_auth))
}
