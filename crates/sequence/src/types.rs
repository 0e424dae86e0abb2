use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use outreach_core::channels::Channel;

/// An ordered, reusable definition of outreach steps for a campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequence {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub status: SequenceStatus,
    pub triggers: Vec<Trigger>,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub stats: SequenceStats,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u32,
}

impl Sequence {
    /// Empty draft sequence with no triggers or steps.
    pub fn draft(name: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.into(),
            status: SequenceStatus::Draft,
            triggers: Vec::new(),
            steps: Vec::new(),
            stats: SequenceStats::default(),
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    pub fn step(&self, id: &Uuid) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == *id)
    }

    pub fn step_index(&self, id: &Uuid) -> Option<usize> {
        self.steps.iter().position(|s| s.id == *id)
    }
}

/// Lifecycle status of a sequence definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceStatus {
    Draft,
    Active,
    Paused,
    Completed,
}

/// How contacts are entered into a sequence. Trigger-matching against
/// external events happens upstream; only the shape is modeled here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Trigger {
    Manual,
    TagAdded { tag: String },
    FormSubmitted { form_id: String },
    ListAdded { list_id: String },
    CampaignCompleted { campaign_id: String },
}

/// One unit of work in a sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: Uuid,
    pub name: String,
    #[serde(flatten)]
    pub kind: StepKind,
    #[serde(default)]
    pub timing: Timing,
    #[serde(default)]
    pub conditions: Vec<StepCondition>,
    #[serde(default)]
    pub stats: StepStats,
}

impl Step {
    pub fn new(name: impl Into<String>, kind: StepKind, timing: Timing) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind,
            timing,
            conditions: Vec::new(),
            stats: StepStats::default(),
        }
    }

    pub fn with_conditions(mut self, conditions: Vec<StepCondition>) -> Self {
        self.conditions = conditions;
        self
    }
}

/// Step payload keyed by step type. Wait steps carry no content by
/// construction; message steps carry exactly the fields their channel needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "config")]
pub enum StepKind {
    Email {
        subject: String,
        content: String,
        #[serde(default)]
        personalized: bool,
    },
    SocialMessage {
        content: String,
        #[serde(default)]
        personalized: bool,
    },
    Sms {
        content: String,
        #[serde(default)]
        personalized: bool,
    },
    Task {
        title: String,
        description: String,
        assignee: Option<String>,
    },
    Wait,
    Condition {
        condition_type: String,
        value: String,
    },
}

impl StepKind {
    /// The delivery channel for message-bearing steps. Wait and condition
    /// steps have no side effect and therefore no channel.
    pub fn channel(&self) -> Option<Channel> {
        match self {
            StepKind::Email { .. } => Some(Channel::Email),
            StepKind::SocialMessage { .. } => Some(Channel::SocialMessage),
            StepKind::Sms { .. } => Some(Channel::Sms),
            StepKind::Task { .. } => Some(Channel::Task),
            StepKind::Wait | StepKind::Condition { .. } => None,
        }
    }

    pub fn type_label(&self) -> &'static str {
        match self {
            StepKind::Email { .. } => "email",
            StepKind::SocialMessage { .. } => "social_message",
            StepKind::Sms { .. } => "sms",
            StepKind::Task { .. } => "task",
            StepKind::Wait => "wait",
            StepKind::Condition { .. } => "condition",
        }
    }
}

/// When a step runs relative to the previous step completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    pub delay: u32,
    pub unit: DelayUnit,
    /// Carried through for future send-window support; delays are currently
    /// wall-clock regardless of this flag.
    #[serde(default, rename = "businessHours")]
    pub business_hours: bool,
}

impl Timing {
    pub fn immediate() -> Self {
        Self {
            delay: 0,
            unit: DelayUnit::Minutes,
            business_hours: false,
        }
    }

    pub fn after(delay: u32, unit: DelayUnit) -> Self {
        Self {
            delay,
            unit,
            business_hours: false,
        }
    }

    /// Canonical duration. Fixed multiples, no calendar arithmetic: a day
    /// is exactly 24 hours.
    pub fn as_duration(&self) -> Duration {
        let minutes = i64::from(self.delay)
            * match self.unit {
                DelayUnit::Minutes => 1,
                DelayUnit::Hours => 60,
                DelayUnit::Days => 60 * 24,
                DelayUnit::Weeks => 60 * 24 * 7,
            };
        Duration::minutes(minutes)
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self::immediate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayUnit {
    Minutes,
    Hours,
    Days,
    Weeks,
}

/// A rule inspecting a contact's interaction state before a step runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCondition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    #[serde(flatten)]
    pub action: ConditionAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
    IfReplied,
    IfNotReplied,
    IfOpened,
    IfNotOpened,
    IfClicked,
    IfNotClicked,
}

/// What happens when a condition matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum ConditionAction {
    Continue,
    Stop,
    JumpTo {
        #[serde(rename = "targetStepId")]
        target_step_id: Uuid,
    },
}

/// Per-step aggregate counters, updated atomically by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepStats {
    pub sent: u64,
    pub opened: u64,
    pub replied: u64,
    pub clicked: u64,
}

/// Sequence-level aggregate stats derived from execution contexts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SequenceStats {
    pub contacts_total: u64,
    pub contacts_completed: u64,
    pub contacts_in_progress: u64,
    pub response_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_conversion() {
        assert_eq!(
            Timing::after(30, DelayUnit::Minutes).as_duration(),
            Duration::minutes(30)
        );
        assert_eq!(
            Timing::after(3, DelayUnit::Days).as_duration(),
            Duration::hours(72)
        );
        assert_eq!(
            Timing::after(2, DelayUnit::Weeks).as_duration(),
            Duration::days(14)
        );
        assert_eq!(Timing::immediate().as_duration(), Duration::zero());
    }

    #[test]
    fn test_step_wire_format() {
        let step = Step::new(
            "Intro email",
            StepKind::Email {
                subject: "Hi {{firstName}}".into(),
                content: "Quick question about {{company}}".into(),
                personalized: true,
            },
            Timing::after(3, DelayUnit::Days),
        );

        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["type"], "email");
        assert_eq!(json["config"]["subject"], "Hi {{firstName}}");
        assert_eq!(json["timing"]["delay"], 3);
        assert_eq!(json["timing"]["unit"], "days");

        let back: Step = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind, step.kind);
    }

    #[test]
    fn test_wait_step_carries_no_config() {
        let step = Step::new("Hold", StepKind::Wait, Timing::after(1, DelayUnit::Weeks));
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["type"], "wait");
        assert!(json.get("config").is_none() || json["config"].is_null());
    }

    #[test]
    fn test_condition_action_wire_format() {
        let target = Uuid::new_v4();
        let cond = StepCondition {
            condition_type: ConditionType::IfReplied,
            action: ConditionAction::JumpTo {
                target_step_id: target,
            },
        };
        let json = serde_json::to_value(&cond).unwrap();
        assert_eq!(json["type"], "if_replied");
        assert_eq!(json["action"], "jump_to");
        assert_eq!(json["targetStepId"], target.to_string());
    }
}
