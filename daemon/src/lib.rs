//! wattrelay daemon library
//!
//! Kept separate from the `wattrelayd` binary so integration tests can
//! drive the real relay loop in-process.

pub mod config;
pub mod metrics;
pub mod publisher;
pub mod relay;
