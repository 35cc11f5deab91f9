//! Shared primitives for the blued Bluetooth management daemon.
//!
//! This crate carries the pieces every other blued crate needs: the
//! canonical [`Address`] type, the wire [`ErrorCode`] table, and the RPC
//! bus building blocks ([`BusRequest`], [`ClientWatch`],
//! [`SubscriptionPoint`]) that bridge transient clients to long-lived
//! service state.

mod address;
mod bus;
mod error;
pub mod params;

pub use address::{Address, AddressParseError};
pub use bus::{BusRequest, ClientWatch, ReplyReceiver, SubscriptionPoint, WatchContext};
pub use error::ErrorCode;
