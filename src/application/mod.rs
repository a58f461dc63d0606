//! Application services layer.

pub mod comments;
pub mod error;
pub mod feed;
pub mod identity;
pub mod posts;
pub mod profile;
pub mod repos;
pub mod uploads;
