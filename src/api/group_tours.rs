use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use tower_sessions::Session;
use uuid::Uuid;

use crate::api::middleware::{auth::get_authenticated_user, session::AppState};
use crate::db::TourStore;
use crate::error::{AppError, Result};
use crate::models::group_tour::{GroupTour, GroupTourSummary, NewGroupTour, TourStatus};
use crate::models::validation::validate_new_group_tour;
use crate::services::group_capacity;

/// Create a tour hosted by the current user
async fn create_tour(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<NewGroupTour>,
) -> Result<(StatusCode, Json<GroupTour>)> {
    let user = get_authenticated_user(&session).await?;

    let errors = validate_new_group_tour(&req);
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let tour = GroupTour::create(&state.pool, req, user.user_id).await?;

    tracing::info!(tour_id = %tour.id, host_id = %tour.host_id, "Group tour created");

    Ok((StatusCode::CREATED, Json(tour)))
}

/// List open tours with free slots
async fn list_tours(State(state): State<AppState>) -> Result<Json<Vec<GroupTourSummary>>> {
    let tours = GroupTour::list_open(&state.pool).await?;
    Ok(Json(tours))
}

async fn get_tour(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<GroupTour>> {
    let tour = state.store.load_tour(id).await?;
    Ok(Json(tour))
}

async fn join_tour(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<GroupTour>> {
    let user = get_authenticated_user(&session).await?;
    let tour = group_capacity::join_tour(&state.store, id, user.user_id, Utc::now()).await?;
    Ok(Json(tour))
}

async fn approve_member(
    State(state): State<AppState>,
    session: Session,
    Path((id, member_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<GroupTour>> {
    let user = get_authenticated_user(&session).await?;
    let tour =
        group_capacity::approve(&state.store, id, user.user_id, member_id, Utc::now()).await?;
    Ok(Json(tour))
}

async fn reject_member(
    State(state): State<AppState>,
    session: Session,
    Path((id, member_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<GroupTour>> {
    let user = get_authenticated_user(&session).await?;
    let tour = group_capacity::reject(&state.store, id, user.user_id, member_id).await?;
    Ok(Json(tour))
}

async fn change_status(
    state: AppState,
    session: Session,
    id: Uuid,
    to: TourStatus,
) -> Result<Json<GroupTour>> {
    let user = get_authenticated_user(&session).await?;
    let tour = group_capacity::change_status(&state.store, id, user.user_id, to).await?;
    Ok(Json(tour))
}

async fn confirm_tour(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<GroupTour>> {
    change_status(state, session, id, TourStatus::Confirmed).await
}

async fn complete_tour(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<GroupTour>> {
    change_status(state, session, id, TourStatus::Completed).await
}

async fn cancel_tour(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<GroupTour>> {
    change_status(state, session, id, TourStatus::Cancelled).await
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/group-tours", get(list_tours).post(create_tour))
        .route("/api/group-tours/:id", get(get_tour))
        .route("/api/group-tours/:id/join", post(join_tour))
        .route(
            "/api/group-tours/:id/members/:user_id/approve",
            post(approve_member),
        )
        .route(
            "/api/group-tours/:id/members/:user_id/reject",
            post(reject_member),
        )
        .route("/api/group-tours/:id/confirm", post(confirm_tour))
        .route("/api/group-tours/:id/complete", post(complete_tour))
        .route("/api/group-tours/:id/cancel", post(cancel_tour))
}
