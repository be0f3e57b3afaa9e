//! wattrelay protocol - the metering link wire format
//!
//! This crate defines everything that crosses a socket:
//! - `ReadingRecord`: the fixed 32-byte meter reading record
//! - `Classifier`/`ReplayGuard`: per-datagram validation state machine
//!   and the replay window / time-sync rate limiter
//! - `ResponseBuilder`: the encrypted echo / time-sync reply
//! - `BusRecord`: the plaintext record published on the local bus

mod bus;
mod classify;
mod frame;
mod record;
mod response;

pub use bus::*;
pub use classify::*;
pub use frame::*;
pub use record::*;
pub use response::*;
