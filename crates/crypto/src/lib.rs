//! wattrelay crypto - symmetric primitives for the metering link
//!
//! This crate provides:
//! - HMAC-SHA256 tag computation with constant-time verification
//! - AES-128-CBC with the zero-IV / sacrificial-block convention used
//!   by the remote meter firmware

mod cbc;
mod hmac_auth;

pub use cbc::*;
pub use hmac_auth::*;
