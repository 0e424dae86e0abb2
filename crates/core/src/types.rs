use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A contact being guided through an outreach sequence. Channel addresses
/// and interaction flags are maintained by external tracking collaborators;
/// the engine only reads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub title: Option<String>,
    pub linkedin_url: Option<String>,
    pub phone: Option<String>,
    pub owner_id: Option<String>,
    /// Arbitrary per-contact properties beyond the known fields.
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub interactions: InteractionState,
}

impl Contact {
    /// Minimal contact with just an id and email, for tests and demos.
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: Some(email.into()),
            first_name: None,
            last_name: None,
            company: None,
            title: None,
            linkedin_url: None,
            phone: None,
            owner_id: None,
            extra: HashMap::new(),
            interactions: InteractionState::default(),
        }
    }

    /// Resolves a personalization field by name: known fields first, then
    /// the `extra` property bag. Returns `None` when the contact has no
    /// value for the name.
    pub fn field(&self, name: &str) -> Option<String> {
        let known = match name {
            "id" | "contact_id" => Some(self.id.clone()),
            "email" => self.email.clone(),
            "firstName" | "first_name" => self.first_name.clone(),
            "lastName" | "last_name" => self.last_name.clone(),
            "company" => self.company.clone(),
            "title" => self.title.clone(),
            "linkedin_url" => self.linkedin_url.clone(),
            "phone" => self.phone.clone(),
            "owner_id" => self.owner_id.clone(),
            _ => None,
        };
        known.or_else(|| self.extra.get(name).map(json_to_display))
    }
}

/// Per-contact engagement flags read by condition evaluation. Written by
/// the channel tracking collaborator, never by the engine itself.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionState {
    pub has_replied: bool,
    pub has_opened: bool,
    pub has_clicked: bool,
}

/// Renders a JSON value the way it should appear inside message content.
pub fn json_to_display(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Kinds of lifecycle events emitted by the engine and deploy adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ContactEntered,
    StepExecuted,
    MessageSent,
    ContactStopped,
    ContactCompleted,
    ContactFailed,
    SequenceDeployed,
}

/// A single engine lifecycle event, routed through an [`crate::event_bus::EventSink`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceEvent {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub sequence_id: Uuid,
    pub contact_id: Option<String>,
    pub step_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_field_precedence() {
        let mut contact = Contact::new("c-1", "ana@example.com");
        contact.first_name = Some("Ana".into());
        contact
            .extra
            .insert("industry".into(), serde_json::json!("saas"));

        assert_eq!(contact.field("firstName").as_deref(), Some("Ana"));
        assert_eq!(contact.field("email").as_deref(), Some("ana@example.com"));
        assert_eq!(contact.field("industry").as_deref(), Some("saas"));
        assert_eq!(contact.field("missing"), None);
    }

    #[test]
    fn test_json_display_is_unquoted() {
        assert_eq!(json_to_display(&serde_json::json!("x")), "x");
        assert_eq!(json_to_display(&serde_json::json!(42)), "42");
        assert_eq!(json_to_display(&serde_json::json!(null)), "");
    }
}
