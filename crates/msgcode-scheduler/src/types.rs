use serde::{Deserialize, Serialize};

/// How a fired job's message is delivered back through the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    Full,
    Summary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub mode: DeliveryMode,
    pub max_chars: usize,
}

impl Default for Delivery {
    fn default() -> Self {
        Self {
            mode: DeliveryMode::Full,
            max_chars: 4000,
        }
    }
}

/// A scheduled job: `{ id, cron, tz, message, delivery, enabled, source }`.
///
/// `chat_id` isn't in the distilled data model but is required for the
/// engine to know which chat's Orchestrator turn to synthesize — every job
/// is created in the context of a bound chat via `/schedule`, so it's
/// carried alongside the rest of the record rather than looked up
/// separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub chat_id: String,
    pub cron: String,
    pub tz: String,
    pub message: String,
    pub delivery: Delivery,
    pub enabled: bool,
    /// `"schedule:<id>"` for jobs created by `/reload` from a config file,
    /// a free-form label for user-created jobs. The `schedule:` prefix is
    /// reserved — `/reload` only ever overwrites that subset.
    pub source: String,
}

impl Job {
    pub const SCHEDULE_SOURCE_PREFIX: &'static str = "schedule:";

    pub fn is_schedule_sourced(&self) -> bool {
        self.source.starts_with(Self::SCHEDULE_SOURCE_PREFIX)
    }
}

/// Emitted by the tick loop for each job whose cron expression matched.
/// Consumed by the Runtime Orchestrator with `source = "schedule:<id>"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiredJob {
    pub job_id: String,
    pub chat_id: String,
    pub message: String,
    pub delivery: Delivery,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_sourced_prefix_detection() {
        let job = Job {
            id: "j1".into(),
            chat_id: "chat-1".into(),
            cron: "0 9 * * *".into(),
            tz: "UTC".into(),
            message: "good morning".into(),
            delivery: Delivery::default(),
            enabled: true,
            source: "schedule:j1".into(),
        };
        assert!(job.is_schedule_sourced());

        let manual = Job {
            source: "manual".into(),
            ..job
        };
        assert!(!manual.is_schedule_sourced());
    }
}
