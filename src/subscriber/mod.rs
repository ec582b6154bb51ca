//! Subscriptions and the pipelines they drive.
//!
//! For every configured subscriber:
//! 1. resolve the source event store and connect it
//! 2. build the message pipeline: decode, bind `payload`, run actions
//! 3. optionally wrap the pipeline in a trailing-edge debounce
//! 4. subscribe on the client
//!
//! A failing action aborts the current run only; the subscription stays
//! registered and keeps delivering.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::condition::ConditionErrorPolicy;
use crate::config::{parse_debounce, ActionConfig, ParseMode, SubscriberConfig};
use crate::event_store::{ClientError, EventStoreManager, InboundMessage, MessageHandler};
use crate::pipeline::{PipelineReport, PipelineRunner};
use crate::vars::Vars;

pub mod debounce;

pub use debounce::{spawn_debounced, DebounceTimer, TimerState, Transition};

/// Errors raised while registering subscriptions.
#[derive(Debug, thiserror::Error)]
pub enum SubscriberError {
    #[error("Subscriber references unknown event store '{0}'")]
    UnknownEventStore(String),

    #[error("Subscriber on '{from}' has invalid debounce '{value}'")]
    InvalidDebounce { value: String, from: String },

    #[error("Subscriber on '{from}' failed: {source}")]
    Client {
        from: String,
        #[source]
        source: ClientError,
    },
}

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// The payload could not be decoded; no action ran.
    Dropped,
    Completed(PipelineReport),
    /// An action failed and the remaining ones were not run.
    Aborted,
}

/// The per-message pipeline of one subscription.
pub struct SubscriptionPipeline {
    from: String,
    parse_as: ParseMode,
    actions: Vec<ActionConfig>,
    runner: Arc<PipelineRunner>,
    vars: Arc<Vars>,
}

impl SubscriptionPipeline {
    pub fn new(config: &SubscriberConfig, runner: Arc<PipelineRunner>, vars: Arc<Vars>) -> Self {
        Self {
            from: config.from.clone(),
            parse_as: config.payload.parse_as,
            actions: config.actions.clone(),
            runner,
            vars,
        }
    }

    /// Decode `message` and run the actions against it.
    pub async fn process(&self, message: InboundMessage) -> MessageOutcome {
        let span = info_span!("subscriber", from = %self.from);
        self.process_inner(message).instrument(span).await
    }

    async fn process_inner(&self, message: InboundMessage) -> MessageOutcome {
        let decoded = match self.parse_as {
            ParseMode::Json => serde_json::from_slice::<serde_json::Value>(&message.data),
        };
        let payload = match decoded {
            Ok(payload) => payload,
            Err(e) => {
                error!(
                    delivery_tag = message.delivery_tag,
                    error = %e,
                    "Failed parsing payload as JSON"
                );
                return MessageOutcome::Dropped;
            }
        };

        debug!(
            delivery_tag = message.delivery_tag,
            routing_key = %message.routing_key,
            "Processing message"
        );

        let vars = self.vars.with_payload(payload);
        match self
            .runner
            .run(&self.actions, &vars, ConditionErrorPolicy::Skip)
            .await
        {
            Ok(report) => MessageOutcome::Completed(report),
            Err(e) => {
                error!(error = %e, "Subscriber pipeline aborted");
                MessageOutcome::Aborted
            }
        }
    }
}

/// Runs the pipeline for every delivery, in order.
struct DirectHandler {
    pipeline: Arc<SubscriptionPipeline>,
}

impl MessageHandler for DirectHandler {
    fn handle(&self, message: InboundMessage) -> BoxFuture<'static, ()> {
        let pipeline = self.pipeline.clone();
        Box::pin(async move {
            pipeline.process(message).await;
        })
    }
}

/// Hands deliveries to a debounce driver.
struct DebouncedHandler {
    from: String,
    tx: mpsc::UnboundedSender<InboundMessage>,
}

impl MessageHandler for DebouncedHandler {
    fn handle(&self, message: InboundMessage) -> BoxFuture<'static, ()> {
        if self.tx.send(message).is_err() {
            warn!(from = %self.from, "Debounce driver stopped, dropping message");
        }
        Box::pin(async {})
    }
}

/// Registers every configured subscription.
pub struct SubscriberManager {
    configs: Vec<SubscriberConfig>,
    stores: Arc<EventStoreManager>,
    runner: Arc<PipelineRunner>,
    vars: Arc<Vars>,
}

impl SubscriberManager {
    pub fn new(
        configs: Vec<SubscriberConfig>,
        stores: Arc<EventStoreManager>,
        runner: Arc<PipelineRunner>,
        vars: Arc<Vars>,
    ) -> Self {
        Self {
            configs,
            stores,
            runner,
            vars,
        }
    }

    /// Connect and subscribe, in configuration order.
    pub async fn init(&self) -> Result<(), SubscriberError> {
        for config in &self.configs {
            self.register(config).await?;
        }
        Ok(())
    }

    async fn register(&self, config: &SubscriberConfig) -> Result<(), SubscriberError> {
        let from = config.from.clone();
        let store = self
            .stores
            .get_client(&from)
            .ok_or_else(|| SubscriberError::UnknownEventStore(from.clone()))?;

        let window = match &config.debounce {
            Some(value) => Some(parse_debounce(value).ok_or_else(|| {
                SubscriberError::InvalidDebounce {
                    value: value.clone(),
                    from: from.clone(),
                }
            })?),
            None => None,
        };

        let client_error = |source| SubscriberError::Client {
            from: from.clone(),
            source,
        };
        store.client.init().await.map_err(client_error)?;

        let pipeline = Arc::new(SubscriptionPipeline::new(
            config,
            self.runner.clone(),
            self.vars.clone(),
        ));

        let handler: Arc<dyn MessageHandler> = match window {
            Some(window) => {
                let tx = spawn_debounced(window, move |message| {
                    let pipeline = pipeline.clone();
                    async move {
                        pipeline.process(message).await;
                    }
                });
                Arc::new(DebouncedHandler {
                    from: from.clone(),
                    tx,
                })
            }
            None => Arc::new(DirectHandler { pipeline }),
        };

        store
            .client
            .subscribe(&config.params, handler)
            .await
            .map_err(client_error)?;

        info!(
            from = %from,
            actions = config.actions.len(),
            debounce_ms = window.map(|w| w.as_millis() as u64),
            "Subscriber registered"
        );
        Ok(())
    }
}
