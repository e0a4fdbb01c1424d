//! Websocket event stream side of the FabConnect backend.
//!
//! Subscribing creates an event stream and a chaincode subscription on the
//! gateway, then listens on the stream's websocket topic. Every delivered
//! frame is acknowledged so the gateway releases the next batch.

use crate::client::FabconnectClient;
use crate::error::FabconnectError;
use crate::model::{
    decode_event_batch, ChainInfoResponse, CorrelateBy, EventStreamCreated, EventStreamRequest,
    SubscriptionFilter, SubscriptionRequest, WebsocketSpec, WsCommand,
};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use ledger_client::{EventSource, EventSubscription, EventTopic, SubscriptionHandle};
use ledger_core::{CommitEvent, LedgerError};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};

const EVENT_BUFFER: usize = 64;

type EventBatches = mpsc::Receiver<Result<Vec<CommitEvent>, LedgerError>>;

/// FabConnect event stream source.
#[derive(Clone)]
pub struct FabconnectEvents {
    client: FabconnectClient,
    correlate_by: CorrelateBy,
    listeners: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl FabconnectEvents {
    pub fn new(client: FabconnectClient) -> Self {
        Self {
            client,
            correlate_by: CorrelateBy::default(),
            listeners: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_correlation(mut self, correlate_by: CorrelateBy) -> Self {
        self.correlate_by = correlate_by;
        self
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, FabconnectError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let config = self.client.config();
        let response = self
            .client
            .http()
            .post(config.endpoint(path))
            .json(body)
            .send()
            .await?;
        Self::decode(path, response).await
    }

    async fn decode<R: DeserializeOwned>(
        path: &str,
        response: reqwest::Response,
    ) -> Result<R, FabconnectError> {
        let status = response.status();
        if !status.is_success() {
            return Err(FabconnectError::UnexpectedStatus {
                endpoint: path.to_string(),
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.json().await?)
    }

    async fn create_stream(&self, batch_size: usize) -> Result<String, FabconnectError> {
        let config = self.client.config();
        let request = EventStreamRequest {
            name: config.stream_name.clone(),
            kind: "websocket".to_string(),
            batch_size,
            websocket: WebsocketSpec {
                topic: config.topic.clone(),
            },
        };
        let created: EventStreamCreated = self.post("/eventstreams", &request).await?;
        info!("Created event stream: {}", created.id);
        Ok(created.id)
    }

    async fn block_height(&self, channel: &str) -> Result<u64, FabconnectError> {
        let config = self.client.config();
        let path = format!(
            "/chainInfo?fly-channel={}&fly-signer={}",
            channel, config.signer
        );
        let response = self
            .client
            .http()
            .get(config.endpoint(&path))
            .send()
            .await?;
        let info: ChainInfoResponse = Self::decode(&path, response).await?;
        Ok(info.result.height)
    }

    async fn create_subscription(
        &self,
        stream_id: &str,
        topic: &EventTopic,
    ) -> Result<(), FabconnectError> {
        let height = self.block_height(&topic.channel).await?;
        let config = self.client.config();
        let request = SubscriptionRequest {
            stream: stream_id.to_string(),
            channel: topic.channel.clone(),
            name: config.subscription_name.clone(),
            signer: config.signer.clone(),
            from_block: height.to_string(),
            payload_type: "json".to_string(),
            filter: SubscriptionFilter {
                chaincode_id: topic.chaincode.clone(),
            },
        };
        let _: serde_json::Value = self.post("/subscriptions", &request).await?;
        debug!(
            "Subscribed to {} on {} from block {}",
            topic.chaincode, topic.channel, height
        );
        Ok(())
    }

    async fn delete_stream(&self, stream_id: &str) -> Result<(), FabconnectError> {
        let config = self.client.config();
        let path = format!("/eventstreams/{stream_id}");
        let response = self
            .client
            .http()
            .delete(config.endpoint(&path))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FabconnectError::UnexpectedStatus {
                endpoint: path,
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }

    async fn open_listener(&self) -> Result<(EventBatches, JoinHandle<()>), FabconnectError> {
        let config = self.client.config();
        let (ws_stream, _) = connect_async(config.ws_url.as_str()).await?;
        let (mut write, mut read) = ws_stream.split();

        let topic = config.topic.clone();
        write
            .send(Message::Text(serde_json::to_string(&WsCommand::Listen {
                topic: &topic,
            })?))
            .await?;
        info!("Listening for events on topic {}", topic);

        let ack = serde_json::to_string(&WsCommand::Ack { topic: &topic })?;
        let correlate_by = self.correlate_by;
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        let listener = tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                let frame = match msg {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Binary(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
                    Ok(Message::Close(_)) => {
                        info!("Event stream websocket closed by gateway");
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        error!("Error receiving event stream message: {}", e);
                        break;
                    }
                };

                let batch = decode_event_batch(&frame, correlate_by)
                    .map_err(|e| LedgerError::Protocol(format!("undecodable event batch: {e}")));
                if tx.send(batch).await.is_err() {
                    break;
                }

                if let Err(e) = write.send(Message::Text(ack.clone())).await {
                    error!("Failed to acknowledge event batch: {}", e);
                    break;
                }
            }
        });

        Ok((rx, listener))
    }
}

#[async_trait]
impl EventSource for FabconnectEvents {
    async fn subscribe(&self, topic: &EventTopic) -> Result<EventSubscription, LedgerError> {
        let stream_id = self
            .create_stream(topic.batch_size)
            .await
            .map_err(FabconnectError::into_connection)?;

        let events = async {
            self.create_subscription(&stream_id, topic).await?;
            self.open_listener().await
        }
        .await;

        match events {
            Ok((events, listener)) => {
                self.listeners.lock().insert(stream_id.clone(), listener);
                Ok(EventSubscription {
                    handle: SubscriptionHandle { id: stream_id },
                    events,
                })
            }
            Err(e) => {
                // leave nothing behind on the gateway when setup fails halfway
                if let Err(cleanup) = self.delete_stream(&stream_id).await {
                    warn!("Failed to delete event stream {}: {}", stream_id, cleanup);
                }
                Err(e.into_connection())
            }
        }
    }

    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<(), LedgerError> {
        if let Some(listener) = self.listeners.lock().remove(&handle.id) {
            listener.abort();
        }

        if !self.client.config().cleanup {
            info!("Keeping event stream {} (cleanup disabled)", handle.id);
            return Ok(());
        }

        info!("Cleaning up event stream: {}", handle.id);
        self.delete_stream(&handle.id)
            .await
            .map_err(FabconnectError::into_query)
    }
}
