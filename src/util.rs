//! Shared utility modules used across obspace components.

pub mod missing;
pub mod varint;
