//! # brickbus
//!
//! Async client for the Tinkerforge brick daemon protocol.
//!
//! A brick daemon multiplexes access to hardware peripherals (bricklets) over
//! a single TCP stream of compact little-endian packets. This crate provides
//! the protocol engine — framing, sequence numbering, request/response
//! correlation, callback dispatch and per-request timeouts — plus thin
//! wrappers for a few bricklets on top of it.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                Device wrappers (tilt, …)               │
//! ├────────────────────────────────────────────────────────┤
//! │  Connection: send / subscribe / unsubscribe / close    │
//! │  ┌────────┐   ┌─────────────┐   ┌────────┐             │
//! │  │ Writer │   │ Coordinator │   │ Reader │             │
//! │  └────────┘   └─────────────┘   └────────┘             │
//! ├────────────────────────────────────────────────────────┤
//! │  Packet codec (8-byte header, length-delimited frames) │
//! ├────────────────────────────────────────────────────────┤
//! │                       TCP                              │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! The writer serializes submissions in FIFO order with freshly allocated
//! sequence numbers; the reader frames and classifies inbound packets; the
//! coordinator exclusively owns the correlation and subscription tables and
//! applies every mutation in intake order, so the maps need no locks.

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

pub mod config;
pub mod connection;
pub mod device;
pub mod error;
pub mod protocol;

pub use config::ConnectionConfig;
pub use connection::{Connection, WILDCARD_UID};
pub use error::{Error, ProtocolError, Result};
pub use protocol::{ErrorCode, Packet, PayloadReader, PayloadWriter};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default brick daemon endpoint.
pub const DEFAULT_ENDPOINT: &str = "localhost:4223";

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::ConnectionConfig;
    pub use crate::connection::{Connection, WILDCARD_UID};
    pub use crate::error::{Error, ProtocolError, Result};
    pub use crate::protocol::{ErrorCode, Packet, PayloadReader, PayloadWriter};
}
