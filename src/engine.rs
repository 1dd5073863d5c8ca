//! Top-level orchestration.
//!
//! [`RequestEngine`] validates the whole configuration before touching the
//! network, then runs either a single call or the pagination loop. Every
//! invocation ends with exactly one of `data` / `error` / `rebound` per
//! attempt, followed by `end`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use request_engine::{
//!     AttachmentSettings, EmitError, Emission, Emitter, HttpAttachmentStore, Message,
//!     PathEvaluator, RequestConfig, RequestEngine, SnapshotStore,
//! };
//!
//! struct Print;
//!
//! #[async_trait]
//! impl Emitter for Print {
//!     async fn emit(&self, emission: Emission) -> Result<(), EmitError> {
//!         println!("{emission:?}");
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config: RequestConfig = serde_json::from_value(serde_json::json!({
//!     "method": "GET",
//!     "url": "'https://api.example.com/items'"
//! }))?;
//! let engine = RequestEngine::new(
//!     Arc::new(PathEvaluator::new()),
//!     Arc::new(Print),
//!     Arc::new(HttpAttachmentStore::new(AttachmentSettings::from_env())?),
//! );
//! engine.execute(&config, Message::default(), SnapshotStore::new()).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::attachment::AttachmentStore;
use crate::auth::resolve_auth;
use crate::classify::{ClassifierSettings, ErrorDisposition, classify};
use crate::config::RequestConfig;
use crate::emit::{Emission, Emitter};
use crate::error::{AttemptError, EngineError};
use crate::expression::Evaluator;
use crate::message::Message;
use crate::pagination::{PaginationEngine, SnapshotStore};
use crate::rate_limit::RateLimitPlan;
use crate::request::{BuildOutcome, RequestBuilder};
use crate::response::{Interpreted, ResponseInterpreter};
use crate::transport::HttpTransport;

/// Entry point: executes a configured request for one inbound message.
#[derive(Clone)]
pub struct RequestEngine {
    evaluator: Arc<dyn Evaluator>,
    emitter: Arc<dyn Emitter>,
    store: Arc<dyn AttachmentStore>,
}

impl RequestEngine {
    /// Creates an engine from its collaborators.
    #[must_use]
    pub fn new(
        evaluator: Arc<dyn Evaluator>,
        emitter: Arc<dyn Emitter>,
        store: Arc<dyn AttachmentStore>,
    ) -> Self {
        Self {
            evaluator,
            emitter,
            store,
        }
    }

    /// Executes `config` for `message`.
    ///
    /// `snapshots` is the persisted pagination state; the returned store
    /// replaces it (unchanged unless pagination is enabled).
    ///
    /// # Errors
    ///
    /// Configuration problems, request-building expression failures, emission
    /// failures and HTTP client construction failures. Failures of the call
    /// itself are classified and emitted instead.
    #[instrument(skip_all, fields(message_id = %message.stream_key(), paging = config.paging_enabled))]
    pub async fn execute(
        &self,
        config: &RequestConfig,
        message: Message,
        snapshots: SnapshotStore,
    ) -> Result<SnapshotStore, EngineError> {
        let evaluator = self.evaluator.as_ref();
        let store = self.store.as_ref();

        let plan = RateLimitPlan::from_config(config)?;
        let timeout = config.request_timeout()?;
        let response_type = config.response_type()?;
        let auth = resolve_auth(config, evaluator)?;
        let builder = RequestBuilder::new(config, &auth, evaluator, store)?;
        let transport =
            HttpTransport::new(config, timeout, response_type).map_err(EngineError::Client)?;

        info!(
            method = %builder.method(),
            timeout_ms = timeout.as_millis(),
            delay_ms = plan.delay().map(|d| d.as_millis()),
            "configuration validated"
        );

        let invocation = Invocation {
            builder,
            transport,
            interpreter: ResponseInterpreter::new(evaluator, store, config.response_validator()),
            classifier: ClassifierSettings::from_config(config),
            plan,
            split_result: config.split_result,
            emitter: self.emitter.as_ref(),
        };

        if config.paging_enabled {
            PaginationEngine::new(
                &invocation,
                evaluator,
                config.last_page_expression(),
                config.snapshot_expression(),
            )
            .run(&message, snapshots)
            .await
        } else {
            invocation.run_single(&message).await?;
            Ok(snapshots)
        }
    }
}

/// Result of one build → send → interpret cycle.
pub(crate) enum Step {
    /// The URL evaluated to nothing.
    Skipped,
    /// The response was interpreted.
    Completed(Interpreted),
    /// The attempt failed and must be classified.
    Failed(AttemptError),
}

/// Collaborators for one validated invocation.
pub(crate) struct Invocation<'a> {
    builder: RequestBuilder<'a>,
    transport: HttpTransport,
    interpreter: ResponseInterpreter<'a>,
    classifier: ClassifierSettings,
    plan: RateLimitPlan,
    split_result: bool,
    emitter: &'a dyn Emitter,
}

impl Invocation<'_> {
    /// Builds, sends and interprets one request.
    pub(crate) async fn attempt(&self, message: &Message) -> Result<Step, EngineError> {
        let request = match self.builder.build(message).await? {
            BuildOutcome::Ready(request) => request,
            BuildOutcome::Skip => return Ok(Step::Skipped),
        };
        let url = request.url.clone();

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(error) => return Ok(Step::Failed(error)),
        };
        match self.interpreter.interpret(&url, response).await {
            Ok(interpreted) => Ok(Step::Completed(interpreted)),
            Err(error) => Ok(Step::Failed(error)),
        }
    }

    /// Emits a result, item by item when splitting, waiting out the rate
    /// limit after each data emission.
    pub(crate) async fn deliver(&self, interpreted: Interpreted) -> Result<(), EngineError> {
        let Interpreted { data, attachments } = interpreted;
        let items = match data {
            Value::Array(items) if self.split_result => items,
            other => vec![other],
        };

        debug!(items = items.len(), "emitting result");
        for item in items {
            let message = Message::with_attachments(item, attachments.clone());
            self.emit(Emission::Data(message)).await?;
            self.plan.wait().await;
        }
        Ok(())
    }

    /// Classifies and emits a failed attempt.
    pub(crate) async fn fail(&self, error: &AttemptError, received: &Value) -> Result<(), EngineError> {
        match classify(error, &self.classifier, received) {
            ErrorDisposition::Rebound(reason) => {
                info!(reason = %reason, "starting rebound");
                self.emit(Emission::Rebound(reason)).await?;
            }
            ErrorDisposition::SoftFail(failure) => {
                debug!(error_code = failure.error_code, "emitting failure as data");
                self.emit(Emission::Data(Message::new(failure.to_payload())))
                    .await?;
                self.plan.wait().await;
            }
            ErrorDisposition::HardFail(report) => {
                warn!(error = %report.message, "request failed");
                self.emit(Emission::Error(report)).await?;
                self.plan.wait().await;
            }
        }
        Ok(())
    }

    /// Forwards one emission and waits for it to be accepted.
    pub(crate) async fn emit(&self, emission: Emission) -> Result<(), EngineError> {
        debug!(kind = emission.kind(), "emit");
        self.emitter.emit(emission).await?;
        Ok(())
    }

    /// Single call: one attempt, its outcome, then `end`.
    async fn run_single(&self, message: &Message) -> Result<(), EngineError> {
        match self.attempt(message).await? {
            Step::Skipped => debug!("nothing to request"),
            Step::Completed(interpreted) => self.deliver(interpreted).await?,
            Step::Failed(error) => self.fail(&error, &message.data_without_snapshot()).await?,
        }
        self.emit(Emission::End).await
    }
}
