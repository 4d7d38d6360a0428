//! Route Store (chat → workspace binding) and State Store (per-chat
//! cursor), the only writers of `routes.json` and `state.json`.

pub mod manager;
pub mod store;
pub mod types;

pub use manager::{RouteStore, StateStore};
pub use store::JsonTable;
pub use types::{ChatState, RouteEntry, RouteStatus};
