//! Job records.

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Done,
    Failed,
}

/// One unit of background work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    /// Selects the runner.
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub state: JobState,
    /// Insertion order; jobs are claimed oldest first.
    #[serde(default)]
    pub seq: u64,
    #[serde(default)]
    pub attempts: u32,
    /// Not claimable before this time.
    #[serde(default)]
    pub run_after: Option<SystemTime>,
    /// Set for recurring jobs.
    #[serde(default, with = "interval_secs")]
    pub interval: Option<Duration>,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl JobRecord {
    /// New queued job with a random id.
    #[must_use]
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self::with_id(uuid::Uuid::new_v4().simple().to_string(), kind, payload)
    }

    #[must_use]
    pub fn with_id(
        id: impl Into<String>,
        kind: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            payload,
            state: JobState::Queued,
            seq: 0,
            attempts: 0,
            run_after: None,
            interval: None,
            last_error: None,
        }
    }

    #[must_use]
    pub fn recurring(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Queued and due at `now`.
    #[must_use]
    pub fn is_ready(&self, now: SystemTime) -> bool {
        self.state == JobState::Queued && self.run_after.map_or(true, |at| at <= now)
    }

    /// Record the outcome of a run. Recurring jobs go back to the queue.
    pub fn finish(&mut self, outcome: Result<(), String>, now: SystemTime) {
        match outcome {
            Ok(()) => {
                self.state = JobState::Done;
                self.last_error = None;
            }
            Err(e) => {
                self.state = JobState::Failed;
                self.last_error = Some(e);
            }
        }
        if let Some(interval) = self.interval {
            self.state = JobState::Queued;
            self.run_after = Some(now + interval);
        }
    }
}

mod interval_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}
