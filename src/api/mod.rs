// API module - HTTP endpoints

pub mod coupons;
pub mod group_tours;
pub mod health;
pub mod middleware;
