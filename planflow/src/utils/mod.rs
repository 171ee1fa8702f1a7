//! Small shared utilities.

pub mod timestamps;
pub mod uuid_utils;

pub use timestamps::{epoch_millis, iso_timestamp, now, Timestamp};
pub use uuid_utils::generate_uuid;
