//! Channel-send capability boundary.
//!
//! Actual delivery (email provider, social messaging, SMS gateway, task
//! queue) lives outside this system. The engine hands a fully personalized
//! [`OutboundMessage`] to an injected [`ChannelSender`] and records the
//! receipt.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{OutreachError, OutreachResult};

/// Delivery channel for an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    SocialMessage,
    Sms,
    Task,
}

/// A personalized message ready for delivery over one channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub channel: Channel,
    /// Channel address: email, profile URL, phone number, or assignee.
    pub to: String,
    pub subject: Option<String>,
    pub body: String,
    pub contact_id: String,
    pub step_id: Uuid,
}

/// Provider acknowledgement for a dispatched message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendReceipt {
    pub message_id: String,
    pub accepted_at: DateTime<Utc>,
}

/// Capability trait the engine delegates step side effects to.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    async fn send(&self, message: OutboundMessage) -> OutreachResult<SendReceipt>;
}

/// Sender that accepts everything and drops it. Default for engines that
/// only compile/deploy and never execute directly.
pub struct NoOpSender;

#[async_trait]
impl ChannelSender for NoOpSender {
    async fn send(&self, message: OutboundMessage) -> OutreachResult<SendReceipt> {
        Ok(SendReceipt {
            message_id: format!("noop-{}", message.step_id),
            accepted_at: Utc::now(),
        })
    }
}

/// In-memory sender that records every message, with an optional scripted
/// failure for exercising delivery-error paths in tests.
#[derive(Default)]
pub struct CaptureSender {
    sent: Mutex<Vec<OutboundMessage>>,
    fail_contact: Mutex<Option<String>>,
}

impl CaptureSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// All sends fail for this contact id until cleared.
    pub fn fail_for_contact(&self, contact_id: impl Into<String>) {
        *self.fail_contact.lock().expect("sender mutex poisoned") = Some(contact_id.into());
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().expect("sender mutex poisoned").clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().expect("sender mutex poisoned").len()
    }
}

#[async_trait]
impl ChannelSender for CaptureSender {
    async fn send(&self, message: OutboundMessage) -> OutreachResult<SendReceipt> {
        let failing = self
            .fail_contact
            .lock()
            .expect("sender mutex poisoned")
            .clone();
        if failing.as_deref() == Some(message.contact_id.as_str()) {
            return Err(OutreachError::Delivery {
                contact_id: message.contact_id,
                reason: "scripted failure".into(),
            });
        }
        let receipt = SendReceipt {
            message_id: format!("cap-{}", Uuid::new_v4()),
            accepted_at: Utc::now(),
        };
        self.sent.lock().expect("sender mutex poisoned").push(message);
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_capture_sender_records_and_fails() {
        let sender = CaptureSender::new();
        let msg = OutboundMessage {
            channel: Channel::Email,
            to: "ana@example.com".into(),
            subject: Some("hello".into()),
            body: "body".into(),
            contact_id: "c-1".into(),
            step_id: Uuid::new_v4(),
        };

        assert!(sender.send(msg.clone()).await.is_ok());
        assert_eq!(sender.sent_count(), 1);

        sender.fail_for_contact("c-1");
        let err = sender.send(msg).await.unwrap_err();
        assert!(matches!(err, OutreachError::Delivery { .. }));
        // Failed sends are not recorded.
        assert_eq!(sender.sent_count(), 1);
    }
}
