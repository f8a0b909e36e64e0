//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! destination URL
//!     → addr.rs (host:port, default ports per scheme)
//!     → dial upstream
//!
//! client connection + upstream connection
//!     → relay.rs (two copy tasks, first termination closes both)
//! ```

pub mod addr;
pub mod relay;

pub use relay::{ConnectionRelay, Direction, RelayError, RelayId};
