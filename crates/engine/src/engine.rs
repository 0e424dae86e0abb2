use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use outreach_core::channels::{Channel, ChannelSender, NoOpSender, OutboundMessage};
use outreach_core::config::EngineConfig;
use outreach_core::event_bus::{make_event, noop_sink, EventSink};
use outreach_core::types::{Contact, EventType};
use outreach_core::{OutreachError, OutreachResult};
use outreach_sequence::{
    validate_for_activation, validate_sequence, ConditionAction, Sequence, SequenceStats,
    SequenceStatus, Step, StepKind, StepStats,
};

use crate::evaluator::{self, ConditionEvaluator, ConditionOutcome};
use crate::personalize::{personalize, unresolved_tokens};
use crate::scheduler::{InMemoryResumeStore, ResumeEntry, ResumeStore};
use crate::state_machine::ExecutionStateMachine;
use crate::types::{ContactRunReport, ExecutionContext, ExecutionState, InteractionUpdate};

/// Direct-execution engine: holds sequence definitions, drives one
/// execution context per (sequence, contact), and suspends at wait points
/// through the injected [`ResumeStore`] instead of sleeping.
///
/// All collaborators (channel delivery, event routing, resume persistence)
/// are injected, so tests run against capture doubles and deployments can
/// swap backends without touching the engine.
#[derive(Clone)]
pub struct SequenceEngine {
    sequences: Arc<DashMap<Uuid, Sequence>>,
    contexts: Arc<DashMap<Uuid, ExecutionContext>>,
    step_stats: Arc<DashMap<Uuid, StepStats>>,
    evaluator: ConditionEvaluator,
    state_machine: Arc<ExecutionStateMachine>,
    sender: Arc<dyn ChannelSender>,
    event_sink: Arc<dyn EventSink>,
    resume_store: Arc<dyn ResumeStore>,
    strict_templates: bool,
    tick_interval: std::time::Duration,
}

impl std::fmt::Debug for SequenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceEngine")
            .field("sequences", &self.sequences.len())
            .field("contexts", &self.contexts.len())
            .finish()
    }
}

impl SequenceEngine {
    /// Engine with a no-op sender and sink and an in-memory resume store.
    pub fn new() -> Self {
        Self {
            sequences: Arc::new(DashMap::new()),
            contexts: Arc::new(DashMap::new()),
            step_stats: Arc::new(DashMap::new()),
            evaluator: ConditionEvaluator::new(),
            state_machine: Arc::new(ExecutionStateMachine::new()),
            sender: Arc::new(NoOpSender),
            event_sink: noop_sink(),
            resume_store: Arc::new(InMemoryResumeStore::new()),
            strict_templates: false,
            tick_interval: std::time::Duration::from_secs(
                EngineConfig::default().tick_interval_secs,
            ),
        }
    }

    pub fn with_sender(mut self, sender: Arc<dyn ChannelSender>) -> Self {
        self.sender = sender;
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    pub fn with_resume_store(mut self, store: Arc<dyn ResumeStore>) -> Self {
        self.resume_store = store;
        self
    }

    pub fn with_config(mut self, config: &EngineConfig) -> Self {
        self.strict_templates = config.strict_templates;
        self.tick_interval = std::time::Duration::from_secs(config.tick_interval_secs);
        self
    }

    // ------------------------------------------------------------------
    // Sequence registry
    // ------------------------------------------------------------------

    /// Validates and stores a draft sequence.
    pub fn create_sequence(&self, sequence: Sequence) -> OutreachResult<Uuid> {
        if sequence.status != SequenceStatus::Draft {
            return Err(OutreachError::InvalidSequence {
                sequence_id: sequence.id,
                reason: format!("new sequences must be draft, got {:?}", sequence.status),
            });
        }
        validate_sequence(&sequence)?;
        let id = sequence.id;
        info!(sequence_id = %id, name = %sequence.name, "Creating sequence");
        self.sequences.insert(id, sequence);
        Ok(id)
    }

    pub fn get_sequence(&self, id: &Uuid) -> Option<Sequence> {
        self.sequences.get(id).map(|r| r.clone())
    }

    pub fn list_sequences(&self) -> Vec<Sequence> {
        self.sequences.iter().map(|r| r.value().clone()).collect()
    }

    /// Replaces a sequence definition. Only drafts are mutable; in-flight
    /// contacts keep the definition they started with at trigger time.
    pub fn update_sequence(&self, sequence: Sequence) -> OutreachResult<()> {
        let mut entry = self
            .sequences
            .get_mut(&sequence.id)
            .ok_or(OutreachError::SequenceNotFound(sequence.id))?;
        if entry.status != SequenceStatus::Draft {
            return Err(OutreachError::InvalidSequence {
                sequence_id: sequence.id,
                reason: format!("sequence is {:?}, only drafts are editable", entry.status),
            });
        }
        validate_sequence(&sequence)?;
        let version = entry.version + 1;
        *entry = Sequence {
            version,
            updated_at: Utc::now(),
            status: SequenceStatus::Draft,
            ..sequence
        };
        Ok(())
    }

    /// Moves a sequence through its lifecycle. Activation re-validates and
    /// requires at least one trigger; pausing cancels every pending wait so
    /// suspended contacts never resume.
    pub fn set_status(&self, id: &Uuid, status: SequenceStatus) -> OutreachResult<()> {
        let mut entry = self
            .sequences
            .get_mut(id)
            .ok_or(OutreachError::SequenceNotFound(*id))?;

        let allowed = matches!(
            (entry.status, status),
            (SequenceStatus::Draft, SequenceStatus::Active)
                | (SequenceStatus::Active, SequenceStatus::Paused)
                | (SequenceStatus::Paused, SequenceStatus::Active)
                | (SequenceStatus::Active, SequenceStatus::Completed)
                | (SequenceStatus::Paused, SequenceStatus::Completed)
        );
        if !allowed {
            return Err(OutreachError::InvalidSequence {
                sequence_id: *id,
                reason: format!("cannot move from {:?} to {:?}", entry.status, status),
            });
        }

        if status == SequenceStatus::Active {
            validate_for_activation(&entry)?;
        }

        info!(sequence_id = %id, ?status, "Updating sequence status");
        entry.status = status;
        entry.updated_at = Utc::now();
        drop(entry);

        if status == SequenceStatus::Paused || status == SequenceStatus::Completed {
            let cancelled = self.resume_store.cancel_sequence(id);
            if cancelled > 0 {
                info!(sequence_id = %id, cancelled, "Cancelled pending wait resumptions");
            }
        }
        Ok(())
    }

    pub fn delete_sequence(&self, id: &Uuid) -> OutreachResult<()> {
        self.sequences
            .remove(id)
            .ok_or(OutreachError::SequenceNotFound(*id))?;
        self.resume_store.cancel_sequence(id);
        info!(sequence_id = %id, "Deleted sequence");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Creates a fresh execution context for one contact. Does not run any
    /// step; pair with [`Self::advance`] or use [`Self::enter_batch`].
    pub fn enter(
        &self,
        sequence_id: &Uuid,
        contact: Contact,
        variables: HashMap<String, String>,
    ) -> OutreachResult<Uuid> {
        let sequence = self
            .sequences
            .get(sequence_id)
            .ok_or(OutreachError::SequenceNotFound(*sequence_id))?;
        if sequence.status != SequenceStatus::Active {
            return Err(OutreachError::InvalidSequence {
                sequence_id: *sequence_id,
                reason: format!("sequence is {:?}, not active", sequence.status),
            });
        }
        drop(sequence);

        let context = ExecutionContext::new(*sequence_id, contact, variables);
        let context_id = context.id;
        info!(
            context_id = %context_id,
            sequence_id = %sequence_id,
            contact_id = %context.contact.id,
            "Contact entered sequence"
        );
        self.event_sink.emit(make_event(
            EventType::ContactEntered,
            *sequence_id,
            Some(context.contact.id.clone()),
            None,
        ));
        self.contexts.insert(context_id, context);
        Ok(context_id)
    }

    /// Enters and advances a batch of contacts. Each contact is independent:
    /// one validation or delivery failure never aborts the rest.
    pub async fn enter_batch(
        &self,
        sequence_id: &Uuid,
        contacts: Vec<Contact>,
        variables: HashMap<String, String>,
        now: DateTime<Utc>,
    ) -> Vec<ContactRunReport> {
        let mut reports = Vec::with_capacity(contacts.len());
        for contact in contacts {
            let contact_id = contact.id.clone();
            let report = match self.enter(sequence_id, contact, variables.clone()) {
                Ok(context_id) => match self.advance(&context_id, now).await {
                    Ok(state) => ContactRunReport {
                        contact_id,
                        context_id: Some(context_id),
                        state: Some(state),
                        error: None,
                    },
                    Err(err) => ContactRunReport {
                        contact_id,
                        context_id: Some(context_id),
                        state: self.get_context(&context_id).map(|c| c.state),
                        error: Some(err.to_string()),
                    },
                },
                Err(err) => ContactRunReport {
                    contact_id,
                    context_id: None,
                    state: None,
                    error: Some(err.to_string()),
                },
            };
            reports.push(report);
        }
        reports
    }

    /// Drives one context forward from its cursor until it suspends at a
    /// wait, reaches a terminal state, or fails a delivery.
    ///
    /// Per step, in order: armed and own conditions, then the delay
    /// suspension, then the channel side effect — so a matching stop halts
    /// the contact before the step's side effect ever runs.
    pub async fn advance(
        &self,
        context_id: &Uuid,
        now: DateTime<Utc>,
    ) -> OutreachResult<ExecutionState> {
        let mut ctx = self
            .contexts
            .get(context_id)
            .map(|r| r.clone())
            .ok_or(OutreachError::ContextNotFound(*context_id))?;

        if ctx.state.is_terminal() {
            return Ok(ctx.state);
        }

        let sequence = self
            .sequences
            .get(&ctx.sequence_id)
            .map(|r| r.clone())
            .ok_or(OutreachError::SequenceNotFound(ctx.sequence_id))?;

        if sequence.status != SequenceStatus::Active {
            debug!(
                context_id = %ctx.id,
                sequence_id = %ctx.sequence_id,
                status = ?sequence.status,
                "Sequence not active, contact stays parked"
            );
            return Ok(ctx.state);
        }

        // A suspended context is only resumable once its wait has elapsed.
        // An early advance (manual call, duplicate resume entry) keeps the
        // contact parked instead of skipping the remaining delay.
        if let Some(at) = ctx.resume_at {
            if at > now {
                debug!(
                    context_id = %ctx.id,
                    resume_at = %at,
                    "Advance before resume time, contact stays suspended"
                );
                return Ok(ctx.state);
            }
        }

        loop {
            // Interaction flags are written by the tracking collaborator
            // while this contact is suspended; pick up the latest.
            self.refresh_interactions(&mut ctx);

            if ctx.cursor >= sequence.steps.len() {
                self.finish(&mut ctx, ExecutionState::Completed, EventType::ContactCompleted)?;
                return Ok(ExecutionState::Completed);
            }

            let step = &sequence.steps[ctx.cursor];
            let resumed = ctx.waited_cursor.take() == Some(ctx.cursor);

            self.set_state(&mut ctx, ExecutionState::Evaluating)?;

            // Stop conditions armed by earlier steps keep applying: a reply
            // that lands during a multi-day wait stops the contact here,
            // before anything else runs.
            if self.armed_stop_matches(&ctx) {
                self.finish(&mut ctx, ExecutionState::Stopped, EventType::ContactStopped)?;
                return Ok(ExecutionState::Stopped);
            }

            if !resumed {
                match self
                    .evaluator
                    .evaluate(&step.conditions, &ctx.contact.interactions)
                {
                    ConditionOutcome::Stop => {
                        self.finish(&mut ctx, ExecutionState::Stopped, EventType::ContactStopped)?;
                        return Ok(ExecutionState::Stopped);
                    }
                    ConditionOutcome::JumpTo(target) => {
                        // Move the cursor without executing the current step.
                        let index = sequence.step_index(&target).ok_or_else(|| {
                            OutreachError::Validation {
                                step_id: step.id,
                                reason: format!("jump_to target {target} vanished"),
                            }
                        })?;
                        debug!(
                            context_id = %ctx.id,
                            from = ctx.cursor,
                            to = index,
                            "Condition redirected cursor"
                        );
                        self.arm_stops(&mut ctx, step);
                        ctx.cursor = index;
                        self.set_state(&mut ctx, ExecutionState::Continuing)?;
                        self.persist(&ctx);
                        continue;
                    }
                    ConditionOutcome::Continue => {
                        self.arm_stops(&mut ctx, step);
                    }
                }

                let delay = step.timing.as_duration();
                if delay > chrono::Duration::zero() {
                    let resume_at = now + delay;
                    ctx.waited_cursor = Some(ctx.cursor);
                    ctx.resume_at = Some(resume_at);
                    self.set_state(&mut ctx, ExecutionState::Waiting)?;
                    self.resume_store.insert(ResumeEntry {
                        context_id: ctx.id,
                        sequence_id: ctx.sequence_id,
                        resume_at,
                    });
                    self.persist(&ctx);
                    debug!(
                        context_id = %ctx.id,
                        step = %step.name,
                        %resume_at,
                        "Contact suspended at wait point"
                    );
                    return Ok(ExecutionState::Waiting);
                }
            }

            // Channel side effect. Wait and condition steps have none.
            if step.kind.channel().is_some() {
                self.set_state(&mut ctx, ExecutionState::Executing)?;
                let message = self.build_message(step, &ctx)?;
                match self.sender.send(message).await {
                    Ok(receipt) => {
                        self.step_stats.entry(step.id).or_default().sent += 1;
                        metrics::counter!(
                            "outreach_messages_sent",
                            "channel" => step.kind.type_label()
                        )
                        .increment(1);
                        ctx.last_message_step = Some(step.id);
                        debug!(
                            context_id = %ctx.id,
                            step = %step.name,
                            message_id = %receipt.message_id,
                            "Message dispatched"
                        );
                        self.event_sink.emit(make_event(
                            EventType::MessageSent,
                            ctx.sequence_id,
                            Some(ctx.contact.id.clone()),
                            Some(step.id),
                        ));
                    }
                    Err(err) => {
                        warn!(
                            context_id = %ctx.id,
                            step = %step.name,
                            error = %err,
                            "Channel send failed, contact marked failed"
                        );
                        ctx.last_error = Some(err.to_string());
                        self.set_state(&mut ctx, ExecutionState::Failed)?;
                        self.persist(&ctx);
                        self.event_sink.emit(make_event(
                            EventType::ContactFailed,
                            ctx.sequence_id,
                            Some(ctx.contact.id.clone()),
                            Some(step.id),
                        ));
                        return Err(err);
                    }
                }
                self.set_state(&mut ctx, ExecutionState::Continuing)?;
            } else {
                self.set_state(&mut ctx, ExecutionState::Continuing)?;
            }

            self.event_sink.emit(make_event(
                EventType::StepExecuted,
                ctx.sequence_id,
                Some(ctx.contact.id.clone()),
                Some(step.id),
            ));
            ctx.cursor += 1;
            ctx.resume_at = None;
            self.persist(&ctx);
        }
    }

    /// Resumes every context whose wait has elapsed. Contexts whose
    /// sequence has been paused since suspension are dropped, not resumed.
    pub async fn tick(&self, now: DateTime<Utc>) -> Vec<ContactRunReport> {
        let due = self.resume_store.drain_due(now);
        let mut reports = Vec::with_capacity(due.len());
        for entry in due {
            let contact_id = self
                .get_context(&entry.context_id)
                .map(|c| c.contact.id)
                .unwrap_or_default();
            let report = match self.advance(&entry.context_id, now).await {
                Ok(state) => ContactRunReport {
                    contact_id,
                    context_id: Some(entry.context_id),
                    state: Some(state),
                    error: None,
                },
                Err(err) => ContactRunReport {
                    contact_id,
                    context_id: Some(entry.context_id),
                    state: self.get_context(&entry.context_id).map(|c| c.state),
                    error: Some(err.to_string()),
                },
            };
            reports.push(report);
        }
        reports
    }

    /// Background driver: polls for due resumptions on the configured tick
    /// interval.
    pub fn spawn_driver(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let engine = Arc::clone(self);
        let interval = self.tick_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let reports = engine.tick(Utc::now()).await;
                if !reports.is_empty() {
                    debug!(resumed = reports.len(), "Resumed due contacts");
                }
            }
        })
    }

    // ------------------------------------------------------------------
    // Interactions & stats
    // ------------------------------------------------------------------

    /// Records an interaction observed by the tracking collaborator. Flags
    /// are set on every live context for the contact, and the step that
    /// sent the most recent message gets the credit in its counters.
    pub fn record_interaction(&self, contact_id: &str, update: InteractionUpdate) -> usize {
        let mut touched = 0;
        for mut entry in self.contexts.iter_mut() {
            if entry.contact.id != contact_id {
                continue;
            }
            let flags = &mut entry.contact.interactions;
            match update {
                InteractionUpdate::Replied => flags.has_replied = true,
                InteractionUpdate::Opened => flags.has_opened = true,
                InteractionUpdate::Clicked => flags.has_clicked = true,
            }
            if let Some(step_id) = entry.last_message_step {
                let mut stats = self.step_stats.entry(step_id).or_default();
                match update {
                    InteractionUpdate::Replied => stats.replied += 1,
                    InteractionUpdate::Opened => stats.opened += 1,
                    InteractionUpdate::Clicked => stats.clicked += 1,
                }
            }
            touched += 1;
        }
        touched
    }

    pub fn get_context(&self, id: &Uuid) -> Option<ExecutionContext> {
        self.contexts.get(id).map(|r| r.clone())
    }

    pub fn contexts_for_sequence(&self, sequence_id: &Uuid) -> Vec<ExecutionContext> {
        self.contexts
            .iter()
            .filter(|r| r.sequence_id == *sequence_id)
            .map(|r| r.clone())
            .collect()
    }

    pub fn step_stats(&self, step_id: &Uuid) -> StepStats {
        self.step_stats
            .get(step_id)
            .map(|s| *s)
            .unwrap_or_default()
    }

    /// Aggregates execution contexts into sequence-level stats.
    pub fn sequence_stats(&self, sequence_id: &Uuid) -> SequenceStats {
        let mut stats = SequenceStats::default();
        let mut replied = 0u64;
        for entry in self.contexts.iter() {
            if entry.sequence_id != *sequence_id {
                continue;
            }
            stats.contacts_total += 1;
            match entry.state {
                ExecutionState::Completed => stats.contacts_completed += 1,
                s if !s.is_terminal() => stats.contacts_in_progress += 1,
                _ => {}
            }
            if entry.contact.interactions.has_replied {
                replied += 1;
            }
        }
        if stats.contacts_total > 0 {
            stats.response_rate = replied as f64 / stats.contacts_total as f64;
        }
        stats
    }

    // ------------------------------------------------------------------
    // Internal helpers
    // ------------------------------------------------------------------

    fn set_state(&self, ctx: &mut ExecutionContext, to: ExecutionState) -> OutreachResult<()> {
        ctx.state = self.state_machine.transition(ctx.state, to)?;
        Ok(())
    }

    fn finish(
        &self,
        ctx: &mut ExecutionContext,
        state: ExecutionState,
        event_type: EventType,
    ) -> OutreachResult<()> {
        self.set_state(ctx, state)?;
        self.persist(ctx);
        info!(
            context_id = %ctx.id,
            contact_id = %ctx.contact.id,
            ?state,
            "Contact execution finished"
        );
        self.event_sink.emit(make_event(
            event_type,
            ctx.sequence_id,
            Some(ctx.contact.id.clone()),
            None,
        ));
        Ok(())
    }

    fn armed_stop_matches(&self, ctx: &ExecutionContext) -> bool {
        ctx.armed_stops
            .iter()
            .any(|ct| evaluator::matches(*ct, &ctx.contact.interactions))
    }

    /// Once execution passes a step carrying stop conditions, those stay
    /// armed for the rest of the run.
    fn arm_stops(&self, ctx: &mut ExecutionContext, step: &Step) {
        for condition in &step.conditions {
            if condition.action == ConditionAction::Stop
                && !ctx.armed_stops.contains(&condition.condition_type)
            {
                ctx.armed_stops.push(condition.condition_type);
            }
        }
    }

    fn refresh_interactions(&self, ctx: &mut ExecutionContext) {
        if let Some(stored) = self.contexts.get(&ctx.id) {
            ctx.contact.interactions = stored.contact.interactions;
        }
    }

    /// Writes execution progress back to the shared registry without
    /// touching the contact record, which the tracking collaborator may
    /// have updated concurrently.
    fn persist(&self, ctx: &ExecutionContext) {
        if let Some(mut stored) = self.contexts.get_mut(&ctx.id) {
            stored.cursor = ctx.cursor;
            stored.state = ctx.state;
            stored.armed_stops = ctx.armed_stops.clone();
            stored.waited_cursor = ctx.waited_cursor;
            stored.resume_at = ctx.resume_at;
            stored.last_message_step = ctx.last_message_step;
            stored.last_error = ctx.last_error.clone();
            stored.updated_at = Utc::now();
        }
    }

    fn build_message(
        &self,
        step: &Step,
        ctx: &ExecutionContext,
    ) -> OutreachResult<OutboundMessage> {
        let contact = &ctx.contact;
        let (channel, subject_raw, body_raw, personalized) = match &step.kind {
            StepKind::Email {
                subject,
                content,
                personalized,
            } => (Channel::Email, Some(subject.as_str()), content.as_str(), *personalized),
            StepKind::SocialMessage {
                content,
                personalized,
            } => (Channel::SocialMessage, None, content.as_str(), *personalized),
            StepKind::Sms {
                content,
                personalized,
            } => (Channel::Sms, None, content.as_str(), *personalized),
            StepKind::Task {
                title, description, ..
            } => (Channel::Task, Some(title.as_str()), description.as_str(), true),
            StepKind::Wait | StepKind::Condition { .. } => {
                return Err(OutreachError::Validation {
                    step_id: step.id,
                    reason: "step kind has no message payload".into(),
                })
            }
        };

        if self.strict_templates {
            let mut missing = unresolved_tokens(body_raw, contact, &ctx.variables);
            if let Some(subject) = subject_raw {
                for token in unresolved_tokens(subject, contact, &ctx.variables) {
                    if !missing.contains(&token) {
                        missing.push(token);
                    }
                }
            }
            if !missing.is_empty() {
                return Err(OutreachError::Validation {
                    step_id: step.id,
                    reason: format!("unresolved template tokens: {}", missing.join(", ")),
                });
            }
        }

        let render = |text: &str| -> String {
            if personalized {
                personalize(text, contact, &ctx.variables)
            } else {
                text.to_string()
            }
        };

        let to = match channel {
            Channel::Email => contact
                .email
                .clone()
                .ok_or_else(|| missing_address(contact, "email"))?,
            Channel::SocialMessage => contact
                .linkedin_url
                .clone()
                .ok_or_else(|| missing_address(contact, "social profile"))?,
            Channel::Sms => contact
                .phone
                .clone()
                .ok_or_else(|| missing_address(contact, "phone"))?,
            // Tasks go to the step assignee, falling back to the contact owner.
            Channel::Task => {
                let assignee = match &step.kind {
                    StepKind::Task { assignee, .. } => assignee.clone(),
                    _ => None,
                };
                assignee
                    .or_else(|| contact.owner_id.clone())
                    .unwrap_or_else(|| "unassigned".to_string())
            }
        };

        Ok(OutboundMessage {
            channel,
            to,
            subject: subject_raw.map(render),
            body: render(body_raw),
            contact_id: contact.id.clone(),
            step_id: step.id,
        })
    }
}

impl Default for SequenceEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn missing_address(contact: &Contact, what: &str) -> OutreachError {
    OutreachError::Delivery {
        contact_id: contact.id.clone(),
        reason: format!("contact has no {what} address"),
    }
}

#[cfg(test)]
mod tests {
    use outreach_core::channels::CaptureSender;
    use outreach_core::event_bus::capture_sink;
    use outreach_sequence::{
        ConditionType, DelayUnit, SequenceStatus, Step, StepCondition, Timing, Trigger,
    };

    use super::*;

    fn two_email_sequence() -> Sequence {
        let mut seq = Sequence::draft("Test", "two emails, stop on reply at second");
        seq.triggers.push(Trigger::Manual);
        seq.steps.push(Step::new(
            "First",
            StepKind::Email {
                subject: "Hi {{firstName}}".into(),
                content: "Intro about {{topic}}".into(),
                personalized: true,
            },
            Timing::immediate(),
        ));
        seq.steps.push(
            Step::new(
                "Second",
                StepKind::Email {
                    subject: "Bump".into(),
                    content: "Still interested?".into(),
                    personalized: true,
                },
                Timing::immediate(),
            )
            .with_conditions(vec![StepCondition {
                condition_type: ConditionType::IfReplied,
                action: ConditionAction::Stop,
            }]),
        );
        seq
    }

    fn active_engine(seq: Sequence) -> (SequenceEngine, Uuid, Arc<CaptureSender>) {
        let sender = Arc::new(CaptureSender::new());
        let engine = SequenceEngine::new().with_sender(sender.clone());
        let id = engine.create_sequence(seq).unwrap();
        engine.set_status(&id, SequenceStatus::Active).unwrap();
        (engine, id, sender)
    }

    fn contact(id: &str) -> Contact {
        let mut c = Contact::new(id, format!("{id}@example.com"));
        c.first_name = Some("Ana".into());
        c
    }

    #[test]
    fn test_create_requires_draft_and_activation_requires_trigger() {
        let engine = SequenceEngine::new();
        let mut seq = two_email_sequence();
        seq.triggers.clear();
        let id = engine.create_sequence(seq).unwrap();

        let err = engine.set_status(&id, SequenceStatus::Active).unwrap_err();
        assert!(matches!(err, OutreachError::InvalidSequence { .. }));
    }

    #[tokio::test]
    async fn test_full_run_sends_and_completes() {
        let (engine, id, sender) = active_engine(two_email_sequence());
        let mut variables = HashMap::new();
        variables.insert("topic".to_string(), "pricing".to_string());

        let ctx_id = engine.enter(&id, contact("c-1"), variables).unwrap();
        let state = engine.advance(&ctx_id, Utc::now()).await.unwrap();

        assert_eq!(state, ExecutionState::Completed);
        let sent = sender.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].subject.as_deref(), Some("Hi Ana"));
        assert_eq!(sent[0].body, "Intro about pricing");
    }

    #[tokio::test]
    async fn test_stop_condition_halts_before_side_effect() {
        let (engine, id, sender) = active_engine(two_email_sequence());
        let mut c = contact("c-2");
        c.interactions.has_replied = true;

        let ctx_id = engine.enter(&id, c, HashMap::new()).unwrap();
        let state = engine.advance(&ctx_id, Utc::now()).await.unwrap();

        // First email still goes out; the conditioned second step stops
        // before its send.
        assert_eq!(state, ExecutionState::Stopped);
        assert_eq!(sender.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_no_reply_continues_to_next_step() {
        let (engine, id, sender) = active_engine(two_email_sequence());
        let ctx_id = engine.enter(&id, contact("c-3"), HashMap::new()).unwrap();
        let state = engine.advance(&ctx_id, Utc::now()).await.unwrap();

        assert_eq!(state, ExecutionState::Completed);
        assert_eq!(sender.sent_count(), 2);
    }

    #[tokio::test]
    async fn test_jump_to_skips_current_step() {
        let mut seq = Sequence::draft("Jump", "");
        seq.triggers.push(Trigger::Manual);
        let final_step = Step::new(
            "Final",
            StepKind::Email {
                subject: "Final".into(),
                content: "final".into(),
                personalized: false,
            },
            Timing::immediate(),
        );
        seq.steps.push(
            Step::new(
                "Skipped when opened",
                StepKind::Email {
                    subject: "Skipped".into(),
                    content: "skipped".into(),
                    personalized: false,
                },
                Timing::immediate(),
            )
            .with_conditions(vec![StepCondition {
                condition_type: ConditionType::IfOpened,
                action: ConditionAction::JumpTo {
                    target_step_id: final_step.id,
                },
            }]),
        );
        seq.steps.push(Step::new(
            "Middle",
            StepKind::Email {
                subject: "Middle".into(),
                content: "middle".into(),
                personalized: false,
            },
            Timing::immediate(),
        ));
        seq.steps.push(final_step);

        let (engine, id, sender) = active_engine(seq);
        let mut c = contact("c-4");
        c.interactions.has_opened = true;

        let ctx_id = engine.enter(&id, c, HashMap::new()).unwrap();
        let state = engine.advance(&ctx_id, Utc::now()).await.unwrap();

        assert_eq!(state, ExecutionState::Completed);
        let subjects: Vec<_> = sender
            .sent()
            .iter()
            .map(|m| m.subject.clone().unwrap())
            .collect();
        assert_eq!(subjects, vec!["Final".to_string()]);
    }

    #[tokio::test]
    async fn test_delivery_failure_scoped_to_one_contact() {
        let (engine, id, sender) = active_engine(two_email_sequence());
        sender.fail_for_contact("bad");

        let reports = engine
            .enter_batch(
                &id,
                vec![contact("bad"), contact("good")],
                HashMap::new(),
                Utc::now(),
            )
            .await;

        assert_eq!(reports.len(), 2);
        assert!(reports[0].error.is_some());
        assert_eq!(reports[0].state, Some(ExecutionState::Failed));
        assert!(reports[1].error.is_none());
        assert_eq!(reports[1].state, Some(ExecutionState::Completed));
        // Only the good contact's two emails went out.
        assert_eq!(sender.sent_count(), 2);
    }

    #[tokio::test]
    async fn test_contexts_are_independent_per_contact() {
        let (engine, id, _sender) = active_engine(two_email_sequence());
        let contacts: Vec<Contact> = (0..5).map(|i| contact(&format!("c-{i}"))).collect();
        let reports = engine
            .enter_batch(&id, contacts, HashMap::new(), Utc::now())
            .await;

        assert_eq!(reports.len(), 5);
        let contexts = engine.contexts_for_sequence(&id);
        assert_eq!(contexts.len(), 5);

        // Flipping one contact's reply flag must not leak to the others.
        engine.record_interaction("c-2", InteractionUpdate::Replied);
        for ctx in engine.contexts_for_sequence(&id) {
            assert_eq!(ctx.contact.interactions.has_replied, ctx.contact.id == "c-2");
        }
    }

    #[tokio::test]
    async fn test_wait_suspends_and_pause_cancels_resumption() {
        let mut seq = two_email_sequence();
        seq.steps[1].timing = Timing::after(3, DelayUnit::Days);
        let (engine, id, sender) = active_engine(seq);

        let start = Utc::now();
        let ctx_id = engine.enter(&id, contact("c-9"), HashMap::new()).unwrap();
        let state = engine.advance(&ctx_id, start).await.unwrap();

        assert_eq!(state, ExecutionState::Waiting);
        assert_eq!(sender.sent_count(), 1);
        let ctx = engine.get_context(&ctx_id).unwrap();
        assert_eq!(ctx.resume_at, Some(start + chrono::Duration::days(3)));

        // Pausing cancels the pending resumption; a later tick is a no-op.
        engine.set_status(&id, SequenceStatus::Paused).unwrap();
        let reports = engine.tick(start + chrono::Duration::days(4)).await;
        assert!(reports.is_empty());
        assert_eq!(sender.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_advance_before_resume_time_keeps_contact_parked() {
        let mut seq = two_email_sequence();
        seq.steps[1].timing = Timing::after(3, DelayUnit::Days);
        let (engine, id, sender) = active_engine(seq);

        let day0 = Utc::now();
        let ctx_id = engine.enter(&id, contact("c-6"), HashMap::new()).unwrap();
        let state = engine.advance(&ctx_id, day0).await.unwrap();
        assert_eq!(state, ExecutionState::Waiting);
        assert_eq!(sender.sent_count(), 1);

        // Advancing again before the wait elapses must not serve the
        // remaining delay early.
        let state = engine.advance(&ctx_id, day0).await.unwrap();
        assert_eq!(state, ExecutionState::Waiting);
        assert_eq!(sender.sent_count(), 1);

        let state = engine
            .advance(&ctx_id, day0 + chrono::Duration::days(2))
            .await
            .unwrap();
        assert_eq!(state, ExecutionState::Waiting);
        assert_eq!(sender.sent_count(), 1);

        // Once due, the wait is served exactly once.
        let reports = engine.tick(day0 + chrono::Duration::days(3)).await;
        assert_eq!(reports[0].state, Some(ExecutionState::Completed));
        assert_eq!(sender.sent_count(), 2);
    }

    #[tokio::test]
    async fn test_strict_templates_reject_unresolved_tokens() {
        let sender = Arc::new(CaptureSender::new());
        let config = EngineConfig {
            tick_interval_secs: 15,
            strict_templates: true,
        };
        let engine = SequenceEngine::new()
            .with_sender(sender.clone())
            .with_config(&config);

        let id = engine.create_sequence(two_email_sequence()).unwrap();
        engine.set_status(&id, SequenceStatus::Active).unwrap();

        // `topic` is not supplied, so the first email fails linting.
        let ctx_id = engine.enter(&id, contact("c-5"), HashMap::new()).unwrap();
        let err = engine.advance(&ctx_id, Utc::now()).await.unwrap_err();
        assert!(matches!(err, OutreachError::Validation { .. }));
        assert_eq!(sender.sent_count(), 0);
    }

    #[test]
    fn test_config_sets_driver_interval() {
        let config = EngineConfig {
            tick_interval_secs: 5,
            strict_templates: false,
        };
        let engine = SequenceEngine::new().with_config(&config);
        assert_eq!(engine.tick_interval, std::time::Duration::from_secs(5));

        let default_engine = SequenceEngine::new();
        assert_eq!(
            default_engine.tick_interval,
            std::time::Duration::from_secs(EngineConfig::default().tick_interval_secs)
        );
    }

    #[tokio::test]
    async fn test_stats_aggregate_across_contacts() {
        let (engine, id, _sender) = active_engine(two_email_sequence());
        let reports = engine
            .enter_batch(
                &id,
                vec![contact("c-1"), contact("c-2")],
                HashMap::new(),
                Utc::now(),
            )
            .await;
        assert!(reports.iter().all(|r| r.error.is_none()));

        engine.record_interaction("c-1", InteractionUpdate::Replied);

        let stats = engine.sequence_stats(&id);
        assert_eq!(stats.contacts_total, 2);
        assert_eq!(stats.contacts_completed, 2);
        assert_eq!(stats.contacts_in_progress, 0);
        assert!((stats.response_rate - 0.5).abs() < f64::EPSILON);

        let seq = engine.get_sequence(&id).unwrap();
        let first_step = engine.step_stats(&seq.steps[0].id);
        assert_eq!(first_step.sent, 2);
        let second_step = engine.step_stats(&seq.steps[1].id);
        assert_eq!(second_step.sent, 2);
        // Reply credited to the most recent message-bearing step.
        assert_eq!(second_step.replied, 1);
    }

    #[tokio::test]
    async fn test_events_emitted_for_lifecycle() {
        let sink = capture_sink();
        let sender = Arc::new(CaptureSender::new());
        let engine = SequenceEngine::new()
            .with_sender(sender)
            .with_event_sink(sink.clone());
        let id = engine.create_sequence(two_email_sequence()).unwrap();
        engine.set_status(&id, SequenceStatus::Active).unwrap();

        let ctx_id = engine.enter(&id, contact("c-1"), HashMap::new()).unwrap();
        engine.advance(&ctx_id, Utc::now()).await.unwrap();

        assert_eq!(sink.count_type(EventType::ContactEntered), 1);
        assert_eq!(sink.count_type(EventType::MessageSent), 2);
        assert_eq!(sink.count_type(EventType::ContactCompleted), 1);
    }
}
