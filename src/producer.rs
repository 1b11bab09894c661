//! NATS reply publisher for scoring results

use crate::types::response::ServiceReply;
use anyhow::Result;
use async_nats::{Client, HeaderMap, Subject};
use tracing::debug;

/// Header carrying the reply status code (200, 400 or 500)
pub const STATUS_HEADER: &str = "Status-Code";

/// Publishes service replies to request inboxes
#[derive(Clone)]
pub struct ReplyPublisher {
    client: Client,
}

impl ReplyPublisher {
    /// Create a new reply publisher
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Publish a reply to the requester's inbox
    pub async fn publish(&self, inbox: Subject, reply: ServiceReply) -> Result<()> {
        let mut headers = HeaderMap::new();
        headers.insert(STATUS_HEADER, reply.status.code().to_string().as_str());

        debug!(
            inbox = %inbox,
            status = reply.status.code(),
            bytes = reply.body.len(),
            "Publishing reply"
        );

        self.client
            .publish_with_headers(inbox, headers, reply.body.into())
            .await?;

        Ok(())
    }
}
