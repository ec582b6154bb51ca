//! Publish action: republishes to a named event store.

use std::sync::Arc;

use tracing::info;

use super::{ActionError, ActionOutput};
use crate::event_store::{EventStoreClient, TopologyParams};

pub struct PublishAction {
    to: String,
    client: Arc<dyn EventStoreClient>,
    params: TopologyParams,
}

impl PublishAction {
    pub fn new(to: impl Into<String>, client: Arc<dyn EventStoreClient>, params: TopologyParams) -> Self {
        Self {
            to: to.into(),
            client,
            params,
        }
    }

    /// Connect the target store if needed, then publish.
    pub async fn execute(&self) -> Result<ActionOutput, ActionError> {
        let client_error = |source| ActionError::Client {
            to: self.to.clone(),
            source,
        };

        self.client.init().await.map_err(client_error)?;
        self.client.publish(&self.params).await.map_err(client_error)?;

        info!(to = %self.to, "Publish action completed");
        Ok(ActionOutput::Published {
            to: self.to.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::mock::MockEventStoreClient;
    use crate::event_store::ClientError;

    #[tokio::test]
    async fn test_client_failure_is_wrapped() {
        let client = Arc::new(MockEventStoreClient::new());
        client.set_fail_on_publish(true).await;

        let action = PublishAction::new("main", client, TopologyParams::default());
        match action.execute().await {
            Err(ActionError::Client { to, source }) => {
                assert_eq!(to, "main");
                assert!(matches!(source, ClientError::Publish(_)));
            }
            other => panic!("expected client error, got {:?}", other.map(|_| ())),
        }
    }
}
