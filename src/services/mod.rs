// Services module - Business logic

pub mod coupon_evaluator;
pub mod group_capacity;
pub mod referral;
