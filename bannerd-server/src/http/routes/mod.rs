//! Route handlers organized by resource

pub mod banners;
pub mod health;
pub mod user_banner;
