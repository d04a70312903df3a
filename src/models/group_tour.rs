use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "tour_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TourStatus {
    Open,
    Confirmed,
    Completed,
    Cancelled,
}

impl TourStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TourStatus::Completed | TourStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "member_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TourMember {
    pub user_id: Uuid,
    pub status: MemberStatus,
    pub request_date: DateTime<Utc>,
    pub approved_date: Option<DateTime<Utc>>,
}

/// A host-organized trip. `current_members` and `is_full` are derived from
/// `members` and must be refreshed with `group_capacity::recompute` before
/// every save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupTour {
    pub id: Uuid,
    pub host_id: Uuid,
    pub title: String,
    pub destination: String,
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub price_per_person: f64,
    pub max_members: i32,
    pub current_members: i32,
    pub is_full: bool,
    pub status: TourStatus,
    pub members: Vec<TourMember>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Listing view of a tour: occupancy without the membership list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupTourSummary {
    pub id: Uuid,
    pub host_id: Uuid,
    pub title: String,
    pub destination: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub price_per_person: f64,
    pub max_members: i32,
    pub current_members: i32,
    pub free_slots: i32,
    pub is_full: bool,
    pub status: TourStatus,
}

#[derive(FromRow)]
struct GroupTourRow {
    id: Uuid,
    host_id: Uuid,
    title: String,
    destination: String,
    description: Option<String>,
    start_date: NaiveDate,
    end_date: NaiveDate,
    price_per_person: f64,
    max_members: i32,
    current_members: i32,
    is_full: bool,
    status: TourStatus,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl GroupTourRow {
    fn into_tour(self, members: Vec<TourMember>) -> GroupTour {
        GroupTour {
            id: self.id,
            host_id: self.host_id,
            title: self.title,
            destination: self.destination,
            description: self.description,
            start_date: self.start_date,
            end_date: self.end_date,
            price_per_person: self.price_per_person,
            max_members: self.max_members,
            current_members: self.current_members,
            is_full: self.is_full,
            status: self.status,
            members,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn into_summary(self) -> GroupTourSummary {
        GroupTourSummary {
            id: self.id,
            host_id: self.host_id,
            title: self.title,
            destination: self.destination,
            start_date: self.start_date,
            end_date: self.end_date,
            price_per_person: self.price_per_person,
            max_members: self.max_members,
            current_members: self.current_members,
            free_slots: (self.max_members - self.current_members).max(0),
            is_full: self.is_full,
            status: self.status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGroupTour {
    pub title: String,
    pub destination: String,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub price_per_person: f64,
    pub max_members: Option<i32>,
}

impl GroupTour {
    /// Creates a tour hosted by `host_id`. The host occupies the first slot.
    pub async fn create(
        pool: &PgPool,
        data: NewGroupTour,
        host_id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        let (Some(start_date), Some(end_date), Some(max_members)) =
            (data.start_date, data.end_date, data.max_members)
        else {
            return Err(sqlx::Error::Protocol(
                "group tour is missing required fields".to_string(),
            ));
        };

        let row = sqlx::query_as::<_, GroupTourRow>(
            r#"
            INSERT INTO group_tours (
                host_id, title, destination, description, start_date, end_date,
                price_per_person, max_members, current_members, is_full
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 1, $9)
            RETURNING *
            "#,
        )
        .bind(host_id)
        .bind(data.title.trim())
        .bind(data.destination.trim())
        .bind(&data.description)
        .bind(start_date)
        .bind(end_date)
        .bind(data.price_per_person)
        .bind(max_members)
        .bind(1 >= max_members)
        .fetch_one(pool)
        .await?;

        Ok(row.into_tour(Vec::new()))
    }

    /// Finds a tour and its ordered membership list
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let row = sqlx::query_as::<_, GroupTourRow>(
            r#"
            SELECT * FROM group_tours WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let members = sqlx::query_as::<_, TourMember>(
            r#"
            SELECT user_id, status, request_date, approved_date FROM tour_members
            WHERE tour_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(id)
        .fetch_all(pool)
        .await?;

        Ok(Some(row.into_tour(members)))
    }

    /// Lists open tours with free slots, soonest first
    pub async fn list_open(pool: &PgPool) -> Result<Vec<GroupTourSummary>, sqlx::Error> {
        let rows = sqlx::query_as::<_, GroupTourRow>(
            r#"
            SELECT * FROM group_tours
            WHERE status = 'open' AND is_full = FALSE AND start_date >= CURRENT_DATE
            ORDER BY start_date ASC
            "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(GroupTourRow::into_summary).collect())
    }

    /// Writes the membership list, derived occupancy fields and status.
    ///
    /// The member rows are replaced wholesale inside the same transaction as
    /// the version-checked update. Returns `Ok(None)` on a version conflict.
    pub async fn save_membership(
        pool: &PgPool,
        tour: &GroupTour,
        expected_version: i32,
    ) -> Result<Option<i32>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let new_version: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE group_tours
            SET current_members = $3, is_full = $4, status = $5,
                version = version + 1, updated_at = NOW()
            WHERE id = $1 AND version = $2
            RETURNING version
            "#,
        )
        .bind(tour.id)
        .bind(expected_version)
        .bind(tour.current_members)
        .bind(tour.is_full)
        .bind(tour.status)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(new_version) = new_version else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query("DELETE FROM tour_members WHERE tour_id = $1")
            .bind(tour.id)
            .execute(&mut *tx)
            .await?;

        for (position, member) in tour.members.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO tour_members (
                    tour_id, position, user_id, status, request_date, approved_date
                )
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(tour.id)
            .bind(position as i32)
            .bind(member.user_id)
            .bind(member.status)
            .bind(member.request_date)
            .bind(member.approved_date)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(Some(new_version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(max_members: i32, current_members: i32) -> GroupTourRow {
        let now = Utc::now();
        GroupTourRow {
            id: Uuid::new_v4(),
            host_id: Uuid::new_v4(),
            title: "Hill stations".to_string(),
            destination: "Munnar".to_string(),
            description: None,
            start_date: NaiveDate::from_ymd_opt(2025, 11, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 11, 5).unwrap(),
            price_per_person: 4500.0,
            max_members,
            current_members,
            is_full: current_members >= max_members,
            status: TourStatus::Open,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_listed_tour_omits_members() {
        let summary = row(6, 4).into_summary();
        assert_eq!(summary.current_members, 4);
        assert_eq!(summary.free_slots, 2);
        assert!(!summary.is_full);

        let json = serde_json::to_value(&summary).unwrap();
        assert!(json.get("members").is_none());
    }

    #[test]
    fn test_listed_full_tour_has_no_free_slots() {
        let summary = row(3, 3).into_summary();
        assert_eq!(summary.free_slots, 0);
        assert!(summary.is_full);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!TourStatus::Open.is_terminal());
        assert!(!TourStatus::Confirmed.is_terminal());
        assert!(TourStatus::Completed.is_terminal());
        assert!(TourStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_member_status_serialization() {
        let json = serde_json::to_string(&MemberStatus::Approved).unwrap();
        assert_eq!(json, r#""approved""#);
    }
}
