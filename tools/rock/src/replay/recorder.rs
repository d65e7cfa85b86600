//! Pass-through wrapper that captures each settled call of one slot.

use crate::errors::MethodError;
use crate::logging::Journal;
use crate::replay::recording::{ErrorRecord, Record};
use crate::runtime::Clock;
use crate::target::Method;
use futures::future::{self, FutureExt};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Append-only record list shared between a recorder and its session.
#[derive(Debug, Clone, Default)]
pub struct RecordSink {
    records: Arc<Mutex<Vec<Record>>>,
}

impl RecordSink {
    /// Appends and returns the record's position.
    pub fn push(&self, record: Record) -> usize {
        let mut records = self.records.lock().expect("record sink lock");
        records.push(record);
        records.len() - 1
    }

    pub fn snapshot(&self) -> Vec<Record> {
        self.records.lock().expect("record sink lock").clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("record sink lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct Recorder {
    slot: String,
    sink: RecordSink,
    clock: Arc<dyn Clock>,
    capture_timing: bool,
    journal: Journal,
}

impl Recorder {
    pub fn new(
        slot: impl Into<String>,
        sink: RecordSink,
        clock: Arc<dyn Clock>,
        capture_timing: bool,
        journal: Journal,
    ) -> Self {
        Self {
            slot: slot.into(),
            sink,
            clock,
            capture_timing,
            journal,
        }
    }

    /// Returns a method that calls `original` and records how it settled.
    ///
    /// The caller sees exactly what `original` produced: the same value on
    /// success, the same `MethodError` on failure. A synchronous invocation
    /// failure becomes a failed call and is recorded like any other, so each
    /// call still owns exactly one record.
    pub fn wrap(self, original: Method) -> Method {
        let recorder = Arc::new(self);
        Method::from_invoke(move |args| {
            let recorder = Arc::clone(&recorder);
            let started_at_ms = recorder.clock.now_ms();
            let call = match original.invoke(args) {
                Ok(call) => call,
                Err(error) => future::ready(Err(MethodError::from(error))).boxed(),
            };
            Ok(async move {
                let outcome = call.await;
                recorder.capture(started_at_ms, &outcome);
                outcome
            }
            .boxed())
        })
    }

    fn capture(&self, started_at_ms: u64, outcome: &Result<Value, MethodError>) {
        let ended_at_ms = self.clock.now_ms();
        let mut record = match outcome {
            Ok(value) => Record::success(value.clone()),
            Err(error) => Record::error(ErrorRecord::from(error)),
        };
        if self.capture_timing {
            record = record.timed(started_at_ms, ended_at_ms);
        }
        let is_error = record.is_error();
        let index = self.sink.push(record);
        debug!(
            fixture = %self.journal.fixture(),
            slot = %self.slot,
            index,
            is_error,
            "call recorded"
        );
        self.journal.append_or_warn(
            "debug",
            "call_recorded",
            json!({
                "slot": self.slot,
                "index": index,
                "outcome": if is_error { "error" } else { "success" },
                "duration_ms": ended_at_ms.saturating_sub(started_at_ms),
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::recording::Outcome;
    use crate::runtime::FakeClock;
    use std::time::Duration;

    fn recorder(sink: &RecordSink, clock: &FakeClock, capture_timing: bool) -> Recorder {
        Recorder::new(
            "fetch-0",
            sink.clone(),
            Arc::new(clock.clone()),
            capture_timing,
            Journal::disabled("test"),
        )
    }

    #[tokio::test]
    async fn success_is_recorded_and_returned_untouched() {
        let clock = FakeClock::default();
        let sink = RecordSink::default();
        let timer = clock.clone();
        let original = Method::new(move |args| {
            let timer = timer.clone();
            async move {
                timer.advance(Duration::from_millis(30));
                Ok(json!({"echo": args}))
            }
        });
        let wrapped = recorder(&sink, &clock, true).wrap(original);

        let value = wrapped
            .invoke(vec![json!(1)])
            .expect("invoke")
            .await
            .expect("value");
        assert_eq!(value, json!({"echo": [1]}));

        let records = sink.snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, Outcome::Success(json!({"echo": [1]})));
        assert_eq!(records[0].duration(), Some(Duration::from_millis(30)));
    }

    #[tokio::test]
    async fn failure_is_recorded_and_original_error_returned() {
        let clock = FakeClock::default();
        let sink = RecordSink::default();
        let original = Method::new(|_| async {
            Err(MethodError::new("timeout")
                .with_code("ETIMEDOUT")
                .with_stack("timeout\ncaused by: connect"))
        });
        let wrapped = recorder(&sink, &clock, false).wrap(original);

        let err = wrapped
            .invoke(vec![])
            .expect("invoke")
            .await
            .err()
            .expect("error");
        assert_eq!(err.code.as_deref(), Some("ETIMEDOUT"));
        assert_eq!(err.stack.as_deref(), Some("timeout\ncaused by: connect"));

        let records = sink.snapshot();
        assert!(records[0].is_error());
        assert!(records[0].started_at_ms.is_none());
    }

    #[tokio::test]
    async fn synchronous_failure_is_recorded_in_position() {
        let clock = FakeClock::default();
        let sink = RecordSink::default();
        let original = Method::typed(|(id,): (u32,)| async move { Ok(id * 2) });
        let wrapped = recorder(&sink, &clock, false).wrap(original);

        let err = wrapped
            .invoke(vec![json!("bad")])
            .expect("invoke")
            .await
            .err()
            .expect("decode failure");
        assert_eq!(err.code.as_deref(), Some("DECODE"));
        let value = wrapped
            .invoke(vec![json!(4)])
            .expect("invoke")
            .await
            .expect("value");
        assert_eq!(value, json!(8));

        let records = sink.snapshot();
        assert_eq!(records.len(), 2);
        match &records[0].outcome {
            Outcome::Error(error) => {
                assert!(error.message.starts_with("decode error"));
                assert_eq!(error.code.as_deref(), Some("DECODE"));
            }
            other => panic!("expected error record, got {other:?}"),
        }
        assert_eq!(records[1].outcome, Outcome::Success(json!(8)));
    }

    #[tokio::test]
    async fn appends_in_completion_order() {
        let clock = FakeClock::default();
        let sink = RecordSink::default();
        let (slow_tx, slow_rx) = tokio::sync::oneshot::channel::<()>();
        let slow_rx = Arc::new(Mutex::new(Some(slow_rx)));
        let original = Method::new(move |args| {
            let gate = slow_rx.lock().expect("gate lock").take();
            async move {
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                Ok(Value::Array(args))
            }
        });
        let wrapped = recorder(&sink, &clock, true).wrap(original);

        let first = wrapped.invoke(vec![json!("slow")]).expect("invoke");
        let second = wrapped.invoke(vec![json!("fast")]).expect("invoke");
        let first = tokio::spawn(first);
        second.await.expect("fast");
        let _ = slow_tx.send(());
        first.await.expect("join").expect("slow");

        let values = sink
            .snapshot()
            .into_iter()
            .map(|r| r.into_result().expect("success"))
            .collect::<Vec<_>>();
        assert_eq!(values, vec![json!(["fast"]), json!(["slow"])]);
    }
}
