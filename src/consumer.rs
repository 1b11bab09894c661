//! NATS subscriptions for incoming scoring requests

use crate::config::NatsConfig;
use anyhow::Result;
use async_nats::{Client, Message};
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use tracing::info;

/// Request kind, derived from the subject it arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Score,
    Predict,
    Health,
}

/// Consumer for scoring, prediction and health requests
pub struct RequestConsumer {
    client: Client,
    score_subject: String,
    predict_subject: String,
    health_subject: String,
}

impl RequestConsumer {
    /// Create a new request consumer
    pub fn new(client: Client, config: &NatsConfig) -> Self {
        Self {
            client,
            score_subject: config.score_subject.clone(),
            predict_subject: config.predict_subject.clone(),
            health_subject: config.health_subject.clone(),
        }
    }

    /// Subscribe to all request subjects, merged into one tagged stream
    pub async fn subscribe(&self) -> Result<BoxStream<'static, (RequestKind, Message)>> {
        let mut streams = Vec::with_capacity(3);

        for (kind, subject) in self.subjects() {
            let subscriber = self.client.subscribe(subject.to_string()).await?;
            info!(subject = %subject, kind = ?kind, "Subscribed to request subject");
            streams.push(subscriber.map(move |message| (kind, message)).boxed());
        }

        Ok(stream::select_all(streams).boxed())
    }

    fn subjects(&self) -> [(RequestKind, &str); 3] {
        [
            (RequestKind::Score, self.score_subject.as_str()),
            (RequestKind::Predict, self.predict_subject.as_str()),
            (RequestKind::Health, self.health_subject.as_str()),
        ]
    }

    /// Get the score subject name
    pub fn score_subject(&self) -> &str {
        &self.score_subject
    }
}

#[cfg(test)]
mod tests {
    // Subscription tests would require a running NATS server
}
