//! HTTP route handlers.

pub mod jobs;
pub mod segments;
pub mod uploads;
pub mod usage;
