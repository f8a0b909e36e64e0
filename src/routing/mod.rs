//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (Host header)
//!     → matcher.rs (normalize host: lowercase, no port)
//!     → router.rs (exact lookup, else "default" route)
//!     → Return: matched ProxyDispatcher or NoMatch
//!
//! Route Compilation (at startup):
//!     RouteConfig[]
//!     → ProxyDispatcher::initialize per route
//!     → Freeze as immutable RouteTable
//! ```

pub mod matcher;
pub mod router;

pub use router::{RouteError, RouteTable};
