//! Event store that accepts every call and does nothing.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{EventStoreClient, MessageHandler, Result, TopologyParams};

/// No-op event store. Publishes are dropped and subscriptions never deliver.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopClient;

#[async_trait]
impl EventStoreClient for NoopClient {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn publish(&self, _params: &TopologyParams) -> Result<()> {
        debug!("Discarding publish on noop event store");
        Ok(())
    }

    async fn subscribe(
        &self,
        _params: &TopologyParams,
        _handler: Arc<dyn MessageHandler>,
    ) -> Result<()> {
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        Ok(())
    }
}
