//! pgw - 6LoWPAN-ND proxy gateway
//!
//! Sits between a classic IPv6 Ethernet link and a 6LoWPAN mesh. Mesh hosts
//! register their addresses with the gateway (RFC 6775), which defends them
//! on the Ethernet side by proxy ND and relays router information back into
//! the mesh.

pub mod capture;
pub mod config;
pub mod dataplane;
pub mod error;
pub mod protocol;
pub mod telemetry;

pub use error::{Error, Result};
