//! Transport Adapter: the only module allowed to invoke the messaging
//! binary. Drives it as a long-lived subprocess over a `LineCodec`,
//! exposing `list`/`send`/`mark`, with identity normalization and
//! exponential-backoff reconnect.

pub mod adapter;
pub mod normalize;
pub mod types;

pub use adapter::TransportAdapter;
pub use types::{Ack, Message, OutboundPayload, TransportStatus};
