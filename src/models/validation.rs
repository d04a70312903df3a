//! Field-level validation driven by per-entity rule tables.
//!
//! Every rule in a table is evaluated so callers get the full list of
//! failing fields in one pass.

use serde::Serialize;

use super::coupon::{DiscountType, NewCoupon};
use super::group_tour::NewGroupTour;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constraint {
    Required,
    Min(f64),
    Max(f64),
    MinLen(usize),
    MaxLen(usize),
}

/// The value a rule inspects, extracted from the entity
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Missing,
    Present,
    Number(f64),
    Text(String),
}

impl FieldValue {
    fn number(value: Option<f64>) -> Self {
        value.map_or(FieldValue::Missing, FieldValue::Number)
    }

    fn present<T>(value: &Option<T>) -> Self {
        if value.is_some() {
            FieldValue::Present
        } else {
            FieldValue::Missing
        }
    }
}

pub struct FieldRule<T> {
    pub field: &'static str,
    pub value: fn(&T) -> FieldValue,
    pub constraint: Constraint,
}

impl<T> FieldRule<T> {
    fn new(field: &'static str, value: fn(&T) -> FieldValue, constraint: Constraint) -> Self {
        Self {
            field,
            value,
            constraint,
        }
    }

    /// Absent values only fail `Required`; other constraints skip them.
    fn check(&self, entity: &T) -> Option<FieldError> {
        let value = (self.value)(entity);
        let message = match (self.constraint, &value) {
            (Constraint::Required, FieldValue::Missing) => Some("is required".to_string()),
            (Constraint::Required, FieldValue::Text(s)) if s.trim().is_empty() => {
                Some("is required".to_string())
            }
            (Constraint::Min(min), FieldValue::Number(n)) if *n < min => {
                Some(format!("must be at least {}", min))
            }
            (Constraint::Max(max), FieldValue::Number(n)) if *n > max => {
                Some(format!("must be at most {}", max))
            }
            (Constraint::MinLen(len), FieldValue::Text(s)) if s.trim().chars().count() < len => {
                Some(format!("must be at least {} characters", len))
            }
            (Constraint::MaxLen(len), FieldValue::Text(s)) if s.trim().chars().count() > len => {
                Some(format!("must be at most {} characters", len))
            }
            _ => None,
        };

        message.map(|m| FieldError::new(self.field, m))
    }
}

pub fn apply_rules<T>(rules: &[FieldRule<T>], entity: &T) -> Vec<FieldError> {
    rules.iter().filter_map(|rule| rule.check(entity)).collect()
}

pub fn coupon_rules() -> Vec<FieldRule<NewCoupon>> {
    use Constraint::*;

    vec![
        FieldRule::new(
            "code",
            |c: &NewCoupon| FieldValue::Text(c.code.clone()),
            Required,
        ),
        FieldRule::new(
            "code",
            |c: &NewCoupon| FieldValue::Text(c.code.clone()),
            MinLen(3),
        ),
        FieldRule::new(
            "code",
            |c: &NewCoupon| FieldValue::Text(c.code.clone()),
            MaxLen(32),
        ),
        FieldRule::new(
            "discount_type",
            |c: &NewCoupon| FieldValue::present(&c.discount_type),
            Required,
        ),
        FieldRule::new(
            "discount_value",
            |c: &NewCoupon| FieldValue::number(c.discount_value),
            Required,
        ),
        FieldRule::new(
            "discount_value",
            |c: &NewCoupon| FieldValue::number(c.discount_value),
            Min(0.0),
        ),
        FieldRule::new(
            "min_purchase_amount",
            |c: &NewCoupon| FieldValue::Number(c.min_purchase_amount),
            Min(0.0),
        ),
        FieldRule::new(
            "max_discount_amount",
            |c: &NewCoupon| FieldValue::number(c.max_discount_amount),
            Min(0.0),
        ),
        FieldRule::new(
            "valid_from",
            |c: &NewCoupon| FieldValue::present(&c.valid_from),
            Required,
        ),
        FieldRule::new(
            "valid_to",
            |c: &NewCoupon| FieldValue::present(&c.valid_to),
            Required,
        ),
        FieldRule::new(
            "usage_limit",
            |c: &NewCoupon| FieldValue::number(c.usage_limit.map(f64::from)),
            Min(1.0),
        ),
    ]
}

pub fn group_tour_rules() -> Vec<FieldRule<NewGroupTour>> {
    use Constraint::*;

    vec![
        FieldRule::new(
            "title",
            |t: &NewGroupTour| FieldValue::Text(t.title.clone()),
            Required,
        ),
        FieldRule::new(
            "title",
            |t: &NewGroupTour| FieldValue::Text(t.title.clone()),
            MaxLen(200),
        ),
        FieldRule::new(
            "destination",
            |t: &NewGroupTour| FieldValue::Text(t.destination.clone()),
            Required,
        ),
        FieldRule::new(
            "destination",
            |t: &NewGroupTour| FieldValue::Text(t.destination.clone()),
            MaxLen(200),
        ),
        FieldRule::new(
            "start_date",
            |t: &NewGroupTour| FieldValue::present(&t.start_date),
            Required,
        ),
        FieldRule::new(
            "end_date",
            |t: &NewGroupTour| FieldValue::present(&t.end_date),
            Required,
        ),
        FieldRule::new(
            "price_per_person",
            |t: &NewGroupTour| FieldValue::Number(t.price_per_person),
            Min(0.0),
        ),
        FieldRule::new(
            "max_members",
            |t: &NewGroupTour| FieldValue::number(t.max_members.map(f64::from)),
            Required,
        ),
        FieldRule::new(
            "max_members",
            |t: &NewGroupTour| FieldValue::number(t.max_members.map(f64::from)),
            Min(2.0),
        ),
        FieldRule::new(
            "max_members",
            |t: &NewGroupTour| FieldValue::number(t.max_members.map(f64::from)),
            Max(50.0),
        ),
    ]
}

/// Validates a coupon before insert: rule table plus cross-field checks
pub fn validate_new_coupon(coupon: &NewCoupon) -> Vec<FieldError> {
    let mut errors = apply_rules(&coupon_rules(), coupon);

    if let (Some(DiscountType::Percentage), Some(value)) =
        (coupon.discount_type, coupon.discount_value)
    {
        if value > 100.0 {
            errors.push(FieldError::new(
                "discount_value",
                "must be at most 100 for percentage coupons",
            ));
        }
    }

    if let (Some(from), Some(to)) = (coupon.valid_from, coupon.valid_to) {
        if from > to {
            errors.push(FieldError::new("valid_to", "must not be before valid_from"));
        }
    }

    errors
}

/// Validates a group tour before insert
pub fn validate_new_group_tour(tour: &NewGroupTour) -> Vec<FieldError> {
    let mut errors = apply_rules(&group_tour_rules(), tour);

    if let (Some(start), Some(end)) = (tour.start_date, tour.end_date) {
        if start > end {
            errors.push(FieldError::new("end_date", "must not be before start_date"));
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn valid_coupon() -> NewCoupon {
        NewCoupon {
            code: "summer20".to_string(),
            description: None,
            discount_type: Some(DiscountType::Percentage),
            discount_value: Some(20.0),
            service_types: Vec::new(),
            min_purchase_amount: 0.0,
            max_discount_amount: Some(2000.0),
            valid_from: Some(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()),
            valid_to: Some(Utc.with_ymd_and_hms(2025, 8, 31, 0, 0, 0).unwrap()),
            usage_limit: Some(100),
        }
    }

    fn valid_tour() -> NewGroupTour {
        NewGroupTour {
            title: "Hill stations".to_string(),
            destination: "Munnar".to_string(),
            description: None,
            start_date: NaiveDate::from_ymd_opt(2025, 11, 1),
            end_date: NaiveDate::from_ymd_opt(2025, 11, 5),
            price_per_person: 4500.0,
            max_members: Some(6),
        }
    }

    #[test]
    fn test_valid_coupon_has_no_errors() {
        assert!(validate_new_coupon(&valid_coupon()).is_empty());
    }

    #[test]
    fn test_coupon_reports_every_failing_field() {
        let coupon = NewCoupon {
            code: " ".to_string(),
            discount_value: Some(-5.0),
            valid_from: None,
            usage_limit: Some(0),
            ..valid_coupon()
        };

        let errors = validate_new_coupon(&coupon);
        let fields: Vec<&str> = errors.iter().map(|e| e.field).collect();

        assert!(fields.contains(&"code"));
        assert!(fields.contains(&"discount_value"));
        assert!(fields.contains(&"valid_from"));
        assert!(fields.contains(&"usage_limit"));
    }

    #[test]
    fn test_percentage_over_100_rejected() {
        let coupon = NewCoupon {
            discount_value: Some(150.0),
            ..valid_coupon()
        };

        let errors = validate_new_coupon(&coupon);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "discount_value");
    }

    #[test]
    fn test_fixed_over_100_allowed() {
        let coupon = NewCoupon {
            discount_type: Some(DiscountType::Fixed),
            discount_value: Some(500.0),
            ..valid_coupon()
        };

        assert!(validate_new_coupon(&coupon).is_empty());
    }

    #[test]
    fn test_inverted_validity_window_rejected() {
        let mut coupon = valid_coupon();
        std::mem::swap(&mut coupon.valid_from, &mut coupon.valid_to);

        let errors = validate_new_coupon(&coupon);
        assert_eq!(errors, vec![FieldError::new("valid_to", "must not be before valid_from")]);
    }

    #[test]
    fn test_tour_needs_room_for_a_guest() {
        let tour = NewGroupTour {
            max_members: Some(1),
            ..valid_tour()
        };

        let errors = validate_new_group_tour(&tour);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "max_members");
        assert_eq!(errors[0].message, "must be at least 2");
    }

    #[test]
    fn test_tour_size_capped() {
        let tour = NewGroupTour {
            max_members: Some(51),
            ..valid_tour()
        };

        let errors = validate_new_group_tour(&tour);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "must be at most 50");
    }

    #[test]
    fn test_tour_missing_fields() {
        let tour = NewGroupTour {
            title: String::new(),
            start_date: None,
            max_members: None,
            ..valid_tour()
        };

        let fields: Vec<&str> = validate_new_group_tour(&tour)
            .iter()
            .map(|e| e.field)
            .collect();
        assert_eq!(fields, vec!["title", "start_date", "max_members"]);
    }

    #[test]
    fn test_tour_dates_out_of_order() {
        let tour = NewGroupTour {
            end_date: NaiveDate::from_ymd_opt(2025, 10, 1),
            ..valid_tour()
        };

        let errors = validate_new_group_tour(&tour);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "end_date");
    }
}
