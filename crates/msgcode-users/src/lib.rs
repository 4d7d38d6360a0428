//! Owner whitelist and sender identity normalization. Trimmed to exactly
//! what the Ingress Loop needs to honor `isFromMe` messages: a single
//! configured owner identity and the punctuation-insensitive comparison
//! rule for emails and phone numbers.

pub mod identity;
pub mod types;
pub mod whitelist;

pub use identity::normalize_identity;
pub use types::OwnerConfig;
pub use whitelist::StaticOwnerWhitelist;
