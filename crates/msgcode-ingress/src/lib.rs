//! Dedup & Rate Gate, per-chat FIFO actors, the Ingress Loop poller, and
//! the Intervention Queue (`steer`/`followUp`).

pub mod actor;
pub mod gate;
pub mod ingress;
pub mod intervention;

pub use actor::{turn_from_message, ChatActorRegistry, TurnContext, TurnHandler};
pub use gate::DedupRateGate;
pub use ingress::{IngressLoop, IngressLoopConfig, OwnerWhitelist};
pub use intervention::{ChatIntervention, InterventionRegistry};
