//! Pagination state and loop.
//!
//! Pagination state lives in a [`SnapshotStore`] keyed by message id. The
//! store is passed into [`crate::RequestEngine::execute`] by value and a new
//! store comes back out; nothing is mutated in place.
//!
//! Each iteration:
//! 1. injects the current snapshot into the message as `data.oihsnapshot`
//! 2. rebuilds the request (URL and body may embed the cursor)
//! 3. sends it and interprets the response
//! 4. evaluates the last-page predicate (undefined means last page)
//! 5. when more pages remain, derives the next snapshot from the response and
//!    emits the updated store
//!
//! Once the last page is reached the stream's entry is removed and the
//! cleared store is emitted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info, instrument, warn};

use crate::constants::SNAPSHOT_FIELD;
use crate::emit::Emission;
use crate::engine::{Invocation, Step};
use crate::error::{AttemptError, EngineError};
use crate::expression::{Evaluator, is_truthy};
use crate::message::{Message, strip_snapshot};

/// Snapshot used when a stream has no stored state: first page, epoch.
#[must_use]
pub fn initial_snapshot() -> Value {
    json!({ "nextPage": 0, "timestamp": 0 })
}

/// Per-stream pagination state keyed by message id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotStore(BTreeMap<String, Value>);

impl SnapshotStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot stored for `id`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Value> {
        self.0.get(id)
    }

    /// Returns a store with `id` set to `snapshot`.
    #[must_use]
    pub fn with_entry(mut self, id: impl Into<String>, snapshot: Value) -> Self {
        self.0.insert(id.into(), snapshot);
        self
    }

    /// Returns a store without `id`.
    #[must_use]
    pub fn without(mut self, id: &str) -> Self {
        self.0.remove(id);
        self
    }

    /// Whether no stream has stored state.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of streams with stored state.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<BTreeMap<String, Value>> for SnapshotStore {
    fn from(entries: BTreeMap<String, Value>) -> Self {
        Self(entries)
    }
}

/// Snapshot for `id`, or [`initial_snapshot`] when none is stored.
#[must_use]
pub fn get_message_snapshot(id: &str, store: Option<&SnapshotStore>) -> Value {
    store
        .and_then(|s| s.get(id))
        .cloned()
        .unwrap_or_else(initial_snapshot)
}

/// What to do after a page.
#[derive(Debug, Clone, PartialEq)]
enum PageOutcome {
    /// Last page reached.
    Done,
    /// Continue with this snapshot.
    Next(Value),
    /// More pages exist but the cursor cannot advance.
    Stuck,
}

/// Repeats build → send → interpret cycles until the last page.
pub(crate) struct PaginationEngine<'a> {
    invocation: &'a Invocation<'a>,
    evaluator: &'a dyn Evaluator,
    last_page: Option<&'a str>,
    next_snapshot: Option<&'a str>,
}

impl<'a> PaginationEngine<'a> {
    pub(crate) fn new(
        invocation: &'a Invocation<'a>,
        evaluator: &'a dyn Evaluator,
        last_page: Option<&'a str>,
        next_snapshot: Option<&'a str>,
    ) -> Self {
        Self {
            invocation,
            evaluator,
            last_page,
            next_snapshot,
        }
    }

    /// Runs the loop for `message` and returns the resulting store.
    ///
    /// A failed page is classified and ends the loop with the stored snapshot
    /// untouched so the next invocation resumes from it. A request that cannot
    /// be built from a later page's snapshot counts as a failed page.
    #[instrument(skip_all, fields(stream = %message.stream_key()))]
    pub(crate) async fn run(
        &self,
        message: &Message,
        store: SnapshotStore,
    ) -> Result<SnapshotStore, EngineError> {
        let key = message.stream_key().to_string();
        let received = message.data_without_snapshot();
        let mut store = store;
        let mut snapshot = get_message_snapshot(&key, Some(&store));
        let mut page = 0_u32;

        loop {
            page += 1;
            debug!(page, snapshot = %snapshot, "fetching page");

            let step = match self.invocation.attempt(&message.with_snapshot(&snapshot)).await {
                // Later pages are built from a server-supplied snapshot.
                Err(EngineError::Expression(error)) if page > 1 => {
                    Step::Failed(AttemptError::from(error))
                }
                other => other?,
            };
            let interpreted = match step {
                Step::Skipped => {
                    debug!(page, "URL evaluated to nothing, treating as last page");
                    break;
                }
                Step::Failed(error) => {
                    self.invocation.fail(&error, &received).await?;
                    self.invocation.emit(Emission::End).await?;
                    return Ok(store);
                }
                Step::Completed(interpreted) => interpreted,
            };

            let outcome = match self.next_page(&interpreted.data, &snapshot) {
                Ok(outcome) => outcome,
                Err(error) => {
                    self.invocation.fail(&error, &received).await?;
                    self.invocation.emit(Emission::End).await?;
                    return Ok(store);
                }
            };

            self.invocation.deliver(interpreted).await?;

            match outcome {
                PageOutcome::Done => break,
                PageOutcome::Stuck => {
                    warn!(page, "more pages reported but no snapshot transform is configured, stopping");
                    break;
                }
                PageOutcome::Next(next) => {
                    store = store.with_entry(key.clone(), next.clone());
                    self.invocation.emit(Emission::Snapshot(store.clone())).await?;
                    snapshot = next;
                }
            }
        }

        let cleared = store.without(&key);
        info!(pages = page, "pagination finished");
        self.invocation.emit(Emission::Snapshot(cleared.clone())).await?;
        self.invocation.emit(Emission::End).await?;
        Ok(cleared)
    }

    fn next_page(&self, data: &Value, snapshot: &Value) -> Result<PageOutcome, AttemptError> {
        let is_last = match self.last_page {
            Some(expression) => match self.evaluator.evaluate(data, expression)? {
                Value::Null => true,
                verdict => is_truthy(&verdict),
            },
            None => true,
        };
        if is_last {
            return Ok(PageOutcome::Done);
        }

        let Some(expression) = self.next_snapshot else {
            return Ok(PageOutcome::Stuck);
        };
        match self.evaluator.evaluate(&with_snapshot_field(data, snapshot), expression)? {
            Value::Null => Ok(PageOutcome::Stuck),
            next => Ok(PageOutcome::Next(strip_snapshot(next))),
        }
    }
}

/// Response data with the prior snapshot at the top level.
fn with_snapshot_field(data: &Value, snapshot: &Value) -> Value {
    let mut map = match data {
        Value::Object(map) => map.clone(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other.clone());
            map
        }
    };
    map.insert(SNAPSHOT_FIELD.to_string(), snapshot.clone());
    Value::Object(map)
}
