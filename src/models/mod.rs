// Models module - Database entity representations

pub mod coupon;
pub mod group_tour;
pub mod validation;

pub use coupon::{Coupon, CouponSummary, CouponUsage, DiscountType, ServiceType};
pub use group_tour::{GroupTour, GroupTourSummary, MemberStatus, TourMember, TourStatus};
