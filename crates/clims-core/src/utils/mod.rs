//! Display helpers shared by the front ends.

pub mod format;

pub use format::{format_bytes, format_date, format_optional, truncate};
