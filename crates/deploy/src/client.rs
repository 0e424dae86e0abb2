//! HTTP client for the external automation runtime.
//!
//! Boundary errors never cross this API as panics or bare `Err`s from
//! `deploy`/`execute`: every network or runtime rejection is folded into an
//! outcome struct so batch callers can remediate per contact.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use outreach_core::config::{RetryConfig, RuntimeConfig};
use outreach_core::event_bus::{make_event, noop_sink, EventSink};
use outreach_core::types::{Contact, EventType};
use outreach_core::{OutreachError, OutreachResult};
use outreach_compiler::WorkflowGraph;
use outreach_sequence::Sequence;

const API_KEY_HEADER: &str = "X-API-KEY";

/// Result of a deploy attempt. `workflow_id` is the runtime-assigned id of
/// the created workflow when `success` is true.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployOutcome {
    pub success: bool,
    #[serde(rename = "workflowId")]
    pub workflow_id: Option<String>,
    pub error: Option<String>,
}

impl DeployOutcome {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            workflow_id: None,
            error: Some(error.into()),
        }
    }
}

/// Per-contact result of a webhook invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationOutcome {
    pub contact_id: String,
    pub success: bool,
    pub error: Option<String>,
}

/// Client for the runtime's workflow-creation, activation, webhook, and
/// execution-listing endpoints.
pub struct RuntimeClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    retry: RetryConfig,
    event_sink: Arc<dyn EventSink>,
}

impl RuntimeClient {
    pub fn new(runtime: &RuntimeConfig, retry: RetryConfig) -> OutreachResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(runtime.timeout_secs))
            .build()
            .map_err(|e| OutreachError::Config(format!("http client: {e}")))?;
        Ok(Self {
            http,
            base_url: runtime.base_url.trim_end_matches('/').to_string(),
            api_key: runtime.api_key.clone(),
            retry,
            event_sink: noop_sink(),
        })
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Compiles the sequence, creates the workflow on the runtime, then
    /// activates it. Any failure along the way is folded into the outcome.
    pub async fn deploy(&self, sequence: &Sequence) -> DeployOutcome {
        let graph = match outreach_compiler::compile(sequence) {
            Ok(graph) => graph,
            Err(err) => {
                warn!(sequence_id = %sequence.id, error = %err, "Compilation failed");
                return DeployOutcome::failure(err.to_string());
            }
        };

        let workflow_id = match self.create_workflow(&graph).await {
            Ok(id) => id,
            Err(err) => {
                warn!(sequence_id = %sequence.id, error = %err, "Workflow creation failed");
                return DeployOutcome::failure(err.to_string());
            }
        };

        if let Err(err) = self.activate_workflow(&workflow_id).await {
            warn!(
                sequence_id = %sequence.id,
                workflow_id = %workflow_id,
                error = %err,
                "Workflow activation failed"
            );
            return DeployOutcome::failure(err.to_string());
        }

        info!(
            sequence_id = %sequence.id,
            workflow_id = %workflow_id,
            nodes = graph.nodes.len(),
            "Sequence deployed and activated"
        );
        metrics::counter!("outreach_deployments").increment(1);
        self.event_sink.emit(make_event(
            EventType::SequenceDeployed,
            sequence.id,
            None,
            None,
        ));

        DeployOutcome {
            success: true,
            workflow_id: Some(workflow_id),
            error: None,
        }
    }

    /// Invokes the deployed workflow's webhook once per contact. Contacts
    /// are independent: no batching, no ordering, one failure never skips
    /// the rest.
    pub async fn execute(
        &self,
        sequence_id: &Uuid,
        workflow_id: &str,
        contacts: &[Contact],
    ) -> Vec<InvocationOutcome> {
        let url = format!("{}/webhook/sequence-{}", self.base_url, sequence_id);
        let mut outcomes = Vec::with_capacity(contacts.len());

        for contact in contacts {
            let body = crate::payload::webhook_payload(contact);
            let result = self.post_with_retry(&url, &body).await;
            let outcome = match result {
                Ok(_) => {
                    debug!(
                        workflow_id = %workflow_id,
                        contact_id = %contact.id,
                        "Webhook invoked"
                    );
                    metrics::counter!("outreach_webhook_invocations").increment(1);
                    InvocationOutcome {
                        contact_id: contact.id.clone(),
                        success: true,
                        error: None,
                    }
                }
                Err(err) => {
                    warn!(
                        workflow_id = %workflow_id,
                        contact_id = %contact.id,
                        error = %err,
                        "Webhook invocation failed"
                    );
                    InvocationOutcome {
                        contact_id: contact.id.clone(),
                        success: false,
                        error: Some(err.to_string()),
                    }
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Read-only pass-through of the runtime's execution listing.
    pub async fn get_status(&self, workflow_id: &str) -> OutreachResult<serde_json::Value> {
        let url = format!("{}/executions?workflowId={}", self.base_url, workflow_id);
        let response = self
            .http
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| OutreachError::Deployment(format!("execution listing: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(OutreachError::Deployment(format!(
                "execution listing returned {status}: {text}"
            )));
        }
        response
            .json()
            .await
            .map_err(|e| OutreachError::Deployment(format!("execution listing body: {e}")))
    }

    // ------------------------------------------------------------------
    // Internal helpers
    // ------------------------------------------------------------------

    async fn create_workflow(&self, graph: &WorkflowGraph) -> OutreachResult<String> {
        let url = format!("{}/workflows", self.base_url);
        let body = serde_json::to_value(graph)?;
        let response = self.post_with_retry(&url, &body).await?;

        // The runtime may return the id as a string or a number.
        match response.get("id") {
            Some(serde_json::Value::String(id)) => Ok(id.clone()),
            Some(serde_json::Value::Number(id)) => Ok(id.to_string()),
            _ => Err(OutreachError::Deployment(
                "workflow creation response carried no id".into(),
            )),
        }
    }

    async fn activate_workflow(&self, workflow_id: &str) -> OutreachResult<()> {
        let url = format!("{}/workflows/{}/activate", self.base_url, workflow_id);
        self.post_with_retry(&url, &serde_json::json!({})).await?;
        Ok(())
    }

    /// POST with the explicit retry policy: transport errors and 5xx
    /// responses are retried with exponential backoff; 4xx rejections are
    /// final.
    async fn post_with_retry(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> OutreachResult<serde_json::Value> {
        let mut backoff = Duration::from_millis(self.retry.initial_backoff_ms);
        let attempts = self.retry.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self
                .http
                .post(url)
                .header(API_KEY_HEADER, &self.api_key)
                .json(body)
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.json().await.or(Ok(serde_json::json!({})));
                    }
                    let text = response.text().await.unwrap_or_default();
                    last_error = format!("{status}: {text}");
                    if status.is_client_error() {
                        break;
                    }
                }
                Err(err) => {
                    last_error = err.to_string();
                }
            }

            if attempt < attempts {
                debug!(url, attempt, error = %last_error, "Retrying runtime call");
                tokio::time::sleep(backoff).await;
                backoff = Duration::from_millis(
                    (backoff.as_millis() as f64 * self.retry.backoff_multiplier) as u64,
                );
            }
        }

        Err(OutreachError::Deployment(format!(
            "{url} failed after {attempts} attempt(s): {last_error}"
        )))
    }
}
