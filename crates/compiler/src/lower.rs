//! Sequence-to-graph lowering.
//!
//! The compiled graph must behave exactly like direct execution: one trigger
//! node, a strictly linear chain of per-step nodes with a synchronization
//! wait auto-inserted before every delayed non-wait step, and `jump_to`
//! branches as the only extra edges. Jump edges land on the target step's
//! entry node — its auto-inserted wait when it has one — so the target's
//! delay applies on arrival just as the direct path would.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use outreach_core::OutreachResult;
use outreach_sequence::{validate_sequence, ConditionAction, Sequence, Step, StepKind};

use crate::graph::{ConnectionTarget, GraphNode, NodeConnections, NodeType, WorkflowGraph};

const BASE_X: f64 = 100.0;
const BASE_Y: f64 = 300.0;
const NODE_PITCH_X: f64 = 260.0;

/// Lowers a validated sequence into a runtime-ready workflow graph.
/// Deterministic: an unchanged definition always compiles to a structurally
/// identical graph.
pub fn compile(sequence: &Sequence) -> OutreachResult<WorkflowGraph> {
    validate_sequence(sequence)?;

    let mut builder = GraphBuilder::new(sequence.name.clone());

    let trigger_id = builder.push(
        "Sequence Trigger",
        NodeType::Trigger,
        serde_json::json!({
            "path": format!("sequence-{}", sequence.id),
            "httpMethod": "POST",
        }),
    );

    // First pass: emit nodes in step order, recording each step's entry
    // node (for incoming edges) and its own node (for outgoing edges).
    let mut entry_ids: Vec<String> = Vec::with_capacity(sequence.steps.len());
    let mut step_ids: Vec<String> = Vec::with_capacity(sequence.steps.len());
    let mut previous = trigger_id;

    for step in &sequence.steps {
        let needs_sync = step.timing.delay > 0 && !matches!(step.kind, StepKind::Wait);
        let entry = if needs_sync {
            let wait_id = builder.push(
                &wait_name(step),
                NodeType::Wait,
                wait_parameters(step),
            );
            builder.connect(&previous, &wait_id);
            previous = wait_id.clone();
            wait_id
        } else {
            String::new() // replaced with the step node id below
        };

        let node_id = builder.push(&step.name, node_type(&step.kind), step_parameters(step));
        builder.connect(&previous, &node_id);
        previous = node_id.clone();

        entry_ids.push(if entry.is_empty() { node_id.clone() } else { entry });
        step_ids.push(node_id);
    }

    // Second pass: jump_to branch edges, from the condition-bearing node
    // straight to the target's entry node.
    for (index, step) in sequence.steps.iter().enumerate() {
        for condition in &step.conditions {
            if let ConditionAction::JumpTo { target_step_id } = condition.action {
                // Target existence is guaranteed by validation.
                if let Some(target_index) = sequence.step_index(&target_step_id) {
                    builder.connect(&step_ids[index], &entry_ids[target_index]);
                }
            }
        }
    }

    let graph = builder.finish();
    debug!(
        sequence_id = %sequence.id,
        nodes = graph.nodes.len(),
        "Compiled sequence into workflow graph"
    );
    Ok(graph)
}

struct GraphBuilder {
    name: String,
    nodes: Vec<GraphNode>,
    connections: BTreeMap<String, NodeConnections>,
    counter: u32,
}

impl GraphBuilder {
    fn new(name: String) -> Self {
        Self {
            name,
            nodes: Vec::new(),
            connections: BTreeMap::new(),
            counter: 0,
        }
    }

    /// Appends a node with a monotonically assigned id and a left-to-right
    /// layout position.
    fn push(&mut self, name: &str, node_type: NodeType, parameters: serde_json::Value) -> String {
        self.counter += 1;
        let id = format!("node_{}", self.counter);
        let position = [
            BASE_X + f64::from(self.counter - 1) * NODE_PITCH_X,
            BASE_Y,
        ];
        self.nodes.push(GraphNode {
            id: id.clone(),
            name: name.to_string(),
            node_type,
            position,
            parameters,
        });
        id
    }

    fn connect(&mut self, from: &str, to: &str) {
        let entry = self.connections.entry(from.to_string()).or_default();
        if entry.main.is_empty() {
            entry.main.push(Vec::new());
        }
        entry.main[0].push(ConnectionTarget::main(to));
    }

    fn finish(self) -> WorkflowGraph {
        WorkflowGraph {
            name: self.name,
            nodes: self.nodes,
            connections: self.connections,
        }
    }
}

fn node_type(kind: &StepKind) -> NodeType {
    match kind {
        StepKind::Email { .. } | StepKind::SocialMessage { .. } | StepKind::Sms { .. } => {
            NodeType::MessageSend
        }
        StepKind::Task { .. } => NodeType::TaskCreate,
        StepKind::Wait => NodeType::Wait,
        StepKind::Condition { .. } => NodeType::Condition,
    }
}

fn wait_name(step: &Step) -> String {
    format!(
        "Wait {} {}",
        step.timing.delay,
        unit_label(step)
    )
}

fn unit_label(step: &Step) -> &'static str {
    use outreach_sequence::DelayUnit::*;
    match step.timing.unit {
        Minutes => "minutes",
        Hours => "hours",
        Days => "days",
        Weeks => "weeks",
    }
}

fn wait_parameters(step: &Step) -> serde_json::Value {
    serde_json::json!({
        "amount": step.timing.delay,
        "unit": unit_label(step),
        "businessHours": step.timing.business_hours,
    })
}

/// Type-specific node parameters. This is the only place template tokens
/// are rewritten into the runtime's own variable-reference syntax.
fn step_parameters(step: &Step) -> serde_json::Value {
    let mut params = match &step.kind {
        StepKind::Email {
            subject,
            content,
            personalized,
        } => serde_json::json!({
            "channel": "email",
            "subject": rewrite_tokens(subject),
            "content": rewrite_tokens(content),
            "personalized": personalized,
        }),
        StepKind::SocialMessage {
            content,
            personalized,
        } => serde_json::json!({
            "channel": "social_message",
            "content": rewrite_tokens(content),
            "personalized": personalized,
        }),
        StepKind::Sms {
            content,
            personalized,
        } => serde_json::json!({
            "channel": "sms",
            "content": rewrite_tokens(content),
            "personalized": personalized,
        }),
        StepKind::Task {
            title,
            description,
            assignee,
        } => serde_json::json!({
            "title": rewrite_tokens(title),
            "description": rewrite_tokens(description),
            "assignee": assignee,
        }),
        StepKind::Wait => wait_parameters(step),
        StepKind::Condition {
            condition_type,
            value,
        } => serde_json::json!({
            "conditionType": condition_type,
            "value": value,
        }),
    };

    if !step.conditions.is_empty() {
        params["conditions"] = serde_json::to_value(&step.conditions).unwrap_or_default();
    }
    params
}

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{([A-Za-z0-9_]+)\}\}").expect("token regex is valid"))
}

/// `{{firstName}}` becomes `{{ $json.firstName }}`, the reference syntax of
/// the webhook payload inside the runtime.
fn rewrite_tokens(text: &str) -> String {
    token_re()
        .replace_all(text, |caps: &regex::Captures<'_>| {
            format!("{{{{ $json.{} }}}}", &caps[1])
        })
        .into_owned()
}
