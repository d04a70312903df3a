use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::store::{StoreError, TourStore};
use crate::models::group_tour::{GroupTour, MemberStatus, TourMember, TourStatus};

#[derive(thiserror::Error, Debug)]
pub enum MembershipError {
    #[error("Group tour not found")]
    NotFound,

    #[error("Group tour is not accepting requests (status: {0:?})")]
    NotOpen(TourStatus),

    #[error("Group tour is full")]
    TourFull,

    #[error("The host is already part of the tour")]
    HostCannotJoin,

    #[error("A pending or approved request already exists for this user")]
    AlreadyRequested,

    #[error("No pending request for this user")]
    NoPendingRequest,

    #[error("Only the host can manage this tour")]
    NotHost,

    #[error("Cannot move tour from {from:?} to {to:?}")]
    InvalidTransition { from: TourStatus, to: TourStatus },

    #[error("Group tour was modified concurrently, reload and retry")]
    Conflict,

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for MembershipError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => MembershipError::Conflict,
            StoreError::NotFound => MembershipError::NotFound,
            other => MembershipError::Store(other),
        }
    }
}

/// Approved members plus the host
fn occupancy(tour: &GroupTour) -> i32 {
    let approved = tour
        .members
        .iter()
        .filter(|m| m.status == MemberStatus::Approved)
        .count() as i32;
    approved + 1
}

/// Refreshes `current_members` and `is_full` from the membership list.
/// Touches nothing else; must run before every save of changed members.
pub fn recompute(mut tour: GroupTour) -> GroupTour {
    tour.current_members = occupancy(&tour);
    tour.is_full = tour.current_members >= tour.max_members;
    tour
}

fn latest_entry_mut(tour: &mut GroupTour, user_id: Uuid) -> Option<&mut TourMember> {
    tour.members.iter_mut().rev().find(|m| m.user_id == user_id)
}

fn ensure_host(tour: &GroupTour, acting_user: Uuid) -> Result<(), MembershipError> {
    if tour.host_id != acting_user {
        return Err(MembershipError::NotHost);
    }
    Ok(())
}

/// Appends a pending join request.
///
/// A user whose previous request was rejected gets a new entry; the
/// rejected one stays in the list as history.
pub fn request_join(
    tour: &mut GroupTour,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(), MembershipError> {
    if tour.status != TourStatus::Open {
        return Err(MembershipError::NotOpen(tour.status));
    }
    if tour.host_id == user_id {
        return Err(MembershipError::HostCannotJoin);
    }
    if occupancy(tour) >= tour.max_members {
        return Err(MembershipError::TourFull);
    }
    if tour
        .members
        .iter()
        .any(|m| m.user_id == user_id && m.status != MemberStatus::Rejected)
    {
        return Err(MembershipError::AlreadyRequested);
    }

    tour.members.push(TourMember {
        user_id,
        status: MemberStatus::Pending,
        request_date: now,
        approved_date: None,
    });

    Ok(())
}

/// Moves the user's pending request to approved, if a slot is free
pub fn approve_member(
    tour: &mut GroupTour,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(), MembershipError> {
    if tour.status.is_terminal() {
        return Err(MembershipError::NotOpen(tour.status));
    }
    let full = occupancy(tour) >= tour.max_members;

    let entry = latest_entry_mut(tour, user_id)
        .filter(|m| m.status == MemberStatus::Pending)
        .ok_or(MembershipError::NoPendingRequest)?;

    if full {
        return Err(MembershipError::TourFull);
    }

    entry.status = MemberStatus::Approved;
    entry.approved_date = Some(now);

    Ok(())
}

pub fn reject_member(tour: &mut GroupTour, user_id: Uuid) -> Result<(), MembershipError> {
    if tour.status.is_terminal() {
        return Err(MembershipError::NotOpen(tour.status));
    }

    let entry = latest_entry_mut(tour, user_id)
        .filter(|m| m.status == MemberStatus::Pending)
        .ok_or(MembershipError::NoPendingRequest)?;

    entry.status = MemberStatus::Rejected;

    Ok(())
}

/// Open -> Confirmed | Cancelled, Confirmed -> Completed | Cancelled
pub fn transition(tour: &mut GroupTour, to: TourStatus) -> Result<(), MembershipError> {
    let allowed = matches!(
        (tour.status, to),
        (TourStatus::Open, TourStatus::Confirmed)
            | (TourStatus::Open, TourStatus::Cancelled)
            | (TourStatus::Confirmed, TourStatus::Completed)
            | (TourStatus::Confirmed, TourStatus::Cancelled)
    );

    if !allowed {
        return Err(MembershipError::InvalidTransition {
            from: tour.status,
            to,
        });
    }

    tour.status = to;
    Ok(())
}

/// Load, mutate, recompute, then save with the loaded version
async fn mutate_tour<S, F>(
    store: &S,
    tour_id: Uuid,
    mutate: F,
) -> Result<GroupTour, MembershipError>
where
    S: TourStore,
    F: FnOnce(&mut GroupTour) -> Result<(), MembershipError>,
{
    let mut tour = store.load_tour(tour_id).await?;
    let expected_version = tour.version;

    mutate(&mut tour)?;

    let mut tour = recompute(tour);
    tour.version = store.save_membership(&tour, expected_version).await?;

    tracing::debug!(
        tour_id = %tour.id,
        current_members = tour.current_members,
        is_full = tour.is_full,
        version = tour.version,
        "Group tour saved"
    );

    Ok(tour)
}

#[tracing::instrument(skip(store))]
pub async fn join_tour<S: TourStore>(
    store: &S,
    tour_id: Uuid,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<GroupTour, MembershipError> {
    let tour = mutate_tour(store, tour_id, |tour| request_join(tour, user_id, now)).await?;
    tracing::info!(tour_id = %tour_id, user_id = %user_id, "Join request created");
    Ok(tour)
}

#[tracing::instrument(skip(store))]
pub async fn approve<S: TourStore>(
    store: &S,
    tour_id: Uuid,
    host_id: Uuid,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<GroupTour, MembershipError> {
    let tour = mutate_tour(store, tour_id, |tour| {
        ensure_host(tour, host_id)?;
        approve_member(tour, user_id, now)
    })
    .await?;
    tracing::info!(
        tour_id = %tour_id,
        user_id = %user_id,
        current_members = tour.current_members,
        "Member approved"
    );
    Ok(tour)
}

#[tracing::instrument(skip(store))]
pub async fn reject<S: TourStore>(
    store: &S,
    tour_id: Uuid,
    host_id: Uuid,
    user_id: Uuid,
) -> Result<GroupTour, MembershipError> {
    let tour = mutate_tour(store, tour_id, |tour| {
        ensure_host(tour, host_id)?;
        reject_member(tour, user_id)
    })
    .await?;
    tracing::info!(tour_id = %tour_id, user_id = %user_id, "Member rejected");
    Ok(tour)
}

#[tracing::instrument(skip(store))]
pub async fn change_status<S: TourStore>(
    store: &S,
    tour_id: Uuid,
    host_id: Uuid,
    to: TourStatus,
) -> Result<GroupTour, MembershipError> {
    let tour = mutate_tour(store, tour_id, |tour| {
        ensure_host(tour, host_id)?;
        transition(tour, to)
    })
    .await?;
    tracing::info!(tour_id = %tour_id, status = ?tour.status, "Group tour status changed");
    Ok(tour)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use chrono::{NaiveDate, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 1, 9, 0, 0).unwrap()
    }

    fn tour(max_members: i32) -> GroupTour {
        GroupTour {
            id: Uuid::new_v4(),
            host_id: Uuid::new_v4(),
            title: "Backwaters weekend".to_string(),
            destination: "Alleppey".to_string(),
            description: None,
            start_date: NaiveDate::from_ymd_opt(2025, 10, 3).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 10, 5).unwrap(),
            price_per_person: 3200.0,
            max_members,
            current_members: 1,
            is_full: false,
            status: TourStatus::Open,
            members: Vec::new(),
            version: 0,
            created_at: now(),
            updated_at: now(),
        }
    }

    fn member(status: MemberStatus) -> TourMember {
        TourMember {
            user_id: Uuid::new_v4(),
            status,
            request_date: now(),
            approved_date: (status == MemberStatus::Approved).then(now),
        }
    }

    #[test]
    fn test_full_with_four_approved_of_five() {
        let mut t = tour(5);
        t.members = (0..4).map(|_| member(MemberStatus::Approved)).collect();

        let t = recompute(t);
        assert_eq!(t.current_members, 5);
        assert!(t.is_full);
    }

    #[test]
    fn test_not_full_with_three_approved_of_five() {
        let mut t = tour(5);
        t.members = (0..3).map(|_| member(MemberStatus::Approved)).collect();
        t.members.push(member(MemberStatus::Pending));
        t.members.push(member(MemberStatus::Rejected));

        let t = recompute(t);
        assert_eq!(t.current_members, 4);
        assert!(!t.is_full);
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let mut t = tour(3);
        t.members = vec![
            member(MemberStatus::Approved),
            member(MemberStatus::Pending),
            member(MemberStatus::Approved),
        ];
        // Stale derived fields from an earlier save.
        t.current_members = 1;
        t.is_full = false;

        let once = recompute(t);
        let twice = recompute(once.clone());
        assert_eq!(once, twice);
        assert!(once.is_full);
    }

    #[test]
    fn test_recompute_touches_only_derived_fields() {
        let mut t = tour(4);
        t.members = vec![member(MemberStatus::Approved)];
        let before = t.clone();

        let after = recompute(t);
        assert_eq!(after.members, before.members);
        assert_eq!(after.status, before.status);
        assert_eq!(after.version, before.version);
        assert_eq!(after.max_members, before.max_members);
        assert_eq!(after.current_members, 2);
    }

    #[test]
    fn test_request_and_approve() {
        let mut t = tour(3);
        let guest = Uuid::new_v4();

        request_join(&mut t, guest, now()).unwrap();
        assert_eq!(t.members.len(), 1);
        assert_eq!(t.members[0].status, MemberStatus::Pending);

        approve_member(&mut t, guest, now()).unwrap();
        assert_eq!(t.members[0].status, MemberStatus::Approved);
        assert_eq!(t.members[0].approved_date, Some(now()));
    }

    #[test]
    fn test_host_cannot_join() {
        let mut t = tour(3);
        let host = t.host_id;

        assert!(matches!(
            request_join(&mut t, host, now()),
            Err(MembershipError::HostCannotJoin)
        ));
    }

    #[test]
    fn test_duplicate_pending_request_refused() {
        let mut t = tour(3);
        let guest = Uuid::new_v4();

        request_join(&mut t, guest, now()).unwrap();
        assert!(matches!(
            request_join(&mut t, guest, now()),
            Err(MembershipError::AlreadyRequested)
        ));
    }

    #[test]
    fn test_re_request_after_rejection_appends() {
        let mut t = tour(3);
        let guest = Uuid::new_v4();

        request_join(&mut t, guest, now()).unwrap();
        reject_member(&mut t, guest).unwrap();
        request_join(&mut t, guest, now()).unwrap();

        assert_eq!(t.members.len(), 2);
        assert_eq!(t.members[0].status, MemberStatus::Rejected);
        assert_eq!(t.members[1].status, MemberStatus::Pending);

        approve_member(&mut t, guest, now()).unwrap();
        assert_eq!(t.members[0].status, MemberStatus::Rejected);
        assert_eq!(t.members[1].status, MemberStatus::Approved);
    }

    #[test]
    fn test_decided_entries_are_terminal() {
        let mut t = tour(4);
        let guest = Uuid::new_v4();

        request_join(&mut t, guest, now()).unwrap();
        approve_member(&mut t, guest, now()).unwrap();

        assert!(matches!(
            reject_member(&mut t, guest),
            Err(MembershipError::NoPendingRequest)
        ));
        assert!(matches!(
            approve_member(&mut t, guest, now()),
            Err(MembershipError::NoPendingRequest)
        ));
    }

    #[test]
    fn test_approval_refused_when_full() {
        let mut t = tour(2);
        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());

        request_join(&mut t, first, now()).unwrap();
        request_join(&mut t, second, now()).unwrap();
        approve_member(&mut t, first, now()).unwrap();

        assert!(matches!(
            approve_member(&mut t, second, now()),
            Err(MembershipError::TourFull)
        ));
        let t = recompute(t);
        assert_eq!(t.current_members, 2);
        assert!(t.is_full);
    }

    #[test]
    fn test_join_refused_when_full_or_closed() {
        let mut t = tour(2);
        t.members.push(member(MemberStatus::Approved));

        assert!(matches!(
            request_join(&mut t, Uuid::new_v4(), now()),
            Err(MembershipError::TourFull)
        ));

        let mut t = tour(5);
        t.status = TourStatus::Cancelled;
        assert!(matches!(
            request_join(&mut t, Uuid::new_v4(), now()),
            Err(MembershipError::NotOpen(TourStatus::Cancelled))
        ));
    }

    #[test]
    fn test_status_transitions() {
        let mut t = tour(5);

        transition(&mut t, TourStatus::Confirmed).unwrap();
        transition(&mut t, TourStatus::Completed).unwrap();
        assert!(matches!(
            transition(&mut t, TourStatus::Cancelled),
            Err(MembershipError::InvalidTransition {
                from: TourStatus::Completed,
                to: TourStatus::Cancelled
            })
        ));

        let mut t = tour(5);
        assert!(transition(&mut t, TourStatus::Completed).is_err());
        transition(&mut t, TourStatus::Cancelled).unwrap();
        assert!(transition(&mut t, TourStatus::Open).is_err());
    }

    #[tokio::test]
    async fn test_store_flow_keeps_derived_fields_fresh() {
        let store = MemoryStore::new();
        let t = tour(3);
        let (tour_id, host) = (t.id, t.host_id);
        store.insert_tour(t).await;

        let guest = Uuid::new_v4();
        join_tour(&store, tour_id, guest, now()).await.unwrap();
        let saved = approve(&store, tour_id, host, guest, now()).await.unwrap();

        assert_eq!(saved.current_members, 2);
        assert!(!saved.is_full);
        assert_eq!(saved.version, 2);

        let stored = store.load_tour(tour_id).await.unwrap();
        assert_eq!(stored, saved);
    }

    #[tokio::test]
    async fn test_only_host_can_approve() {
        let store = MemoryStore::new();
        let t = tour(3);
        let tour_id = t.id;
        store.insert_tour(t).await;

        let guest = Uuid::new_v4();
        join_tour(&store, tour_id, guest, now()).await.unwrap();

        let err = approve(&store, tour_id, guest, guest, now())
            .await
            .unwrap_err();
        assert!(matches!(err, MembershipError::NotHost));
    }

    #[tokio::test]
    async fn test_stale_save_conflicts() {
        let store = MemoryStore::new();
        let t = tour(3);
        let tour_id = t.id;
        store.insert_tour(t).await;

        let mut stale = store.load_tour(tour_id).await.unwrap();
        join_tour(&store, tour_id, Uuid::new_v4(), now())
            .await
            .unwrap();

        request_join(&mut stale, Uuid::new_v4(), now()).unwrap();
        let stale = recompute(stale);
        let err = store.save_membership(&stale, 0).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
    }

    #[tokio::test]
    async fn test_unknown_tour() {
        let store = MemoryStore::new();

        let err = join_tour(&store, Uuid::new_v4(), Uuid::new_v4(), now())
            .await
            .unwrap_err();
        assert!(matches!(err, MembershipError::NotFound));
    }
}
