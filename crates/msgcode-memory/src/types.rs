use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One stored chunk of long-term memory text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: i64,
    pub text: String,
    pub text_digest: String,
    pub created_at: DateTime<Utc>,
}

/// A single hit returned by [`crate::manager::MemoryStore::search`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub text: String,
    pub score: f64,
    pub reasons: Vec<SearchReason>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchReason {
    Vector,
    Text,
}

/// Fusion weights applied when both vector and FTS results are available.
#[derive(Debug, Clone, Copy)]
pub struct FusionWeights {
    pub vector: f64,
    pub text: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            vector: 0.7,
            text: 0.3,
        }
    }
}
