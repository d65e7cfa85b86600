//! Replays one slot's records in call order without touching the real method.

use crate::config::TimingConfig;
use crate::errors::RockError;
use crate::logging::Journal;
use crate::replay::recording::Record;
use crate::runtime::Clock;
use crate::target::{Call, Method};
use futures::FutureExt;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct Player {
    slot: String,
    records: Arc<[Record]>,
    counter: Arc<AtomicUsize>,
    clock: Arc<dyn Clock>,
    timing: TimingConfig,
    journal: Journal,
}

impl Player {
    pub fn new(
        slot: impl Into<String>,
        records: Vec<Record>,
        counter: Arc<AtomicUsize>,
        clock: Arc<dyn Clock>,
        timing: TimingConfig,
        journal: Journal,
    ) -> Self {
        Self {
            slot: slot.into(),
            records: records.into(),
            counter,
            clock,
            timing,
            journal,
        }
    }

    pub fn into_method(self) -> Method {
        let player = Arc::new(self);
        Method::from_invoke(move |_args| player.serve())
    }

    /// Claims the next index before returning, so back-to-back calls get
    /// increasing indices in the order they were made.
    fn serve(&self) -> Result<Call, RockError> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst);
        let Some(record) = self.records.get(index).cloned() else {
            warn!(
                fixture = %self.journal.fixture(),
                slot = %self.slot,
                index,
                recorded = self.records.len(),
                "replay record not found"
            );
            self.journal.append_or_warn(
                "warn",
                "record_not_found",
                json!({"slot": self.slot, "index": index, "recorded": self.records.len()}),
            );
            return Err(RockError::RecordNotFound {
                slot: self.slot.clone(),
                index,
                recorded: self.records.len(),
            });
        };

        let delay = self.timing.replay_delay_for(record.duration());
        debug!(
            fixture = %self.journal.fixture(),
            slot = %self.slot,
            index,
            delay_ms = delay.map(|d| d.as_millis() as u64),
            "replaying call"
        );
        self.journal.append_or_warn(
            "debug",
            "call_replayed",
            json!({
                "slot": self.slot,
                "index": index,
                "outcome": if record.is_error() { "error" } else { "success" },
            }),
        );

        let clock = Arc::clone(&self.clock);
        Ok(async move {
            if let Some(delay) = delay {
                clock.sleep(delay).await;
            }
            record.into_result()
        }
        .boxed())
    }
}
