//! Repository implementations for database access
//!
//! Patterns shared by every operation:
//! - Dynamic filters composed with QueryBuilder, not enumerated statements
//! - Conflict-aware inserts against schema constraints
//! - Transactions for multi-step writes, rolled back on any failure

pub mod banners;

pub use banners::{
    Banner, BannerFilter, BannerRepo, BannerUpdate, BannerWithTags, DbError, Feature, NewBanner,
    Tag,
};
