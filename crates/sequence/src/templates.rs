//! Built-in sequence templates. A new sequence starts from one of these or
//! from `Sequence::draft` for fully custom authoring; templates come back in
//! `Draft` so they can still be edited before activation.

use crate::types::{
    ConditionAction, ConditionType, DelayUnit, Sequence, Step, StepCondition, StepKind, Timing,
    Trigger,
};

/// Three-touch cold email sequence: intro, bump after 3 days unless the
/// contact replied, breakup after another 4 days.
pub fn cold_outreach_template() -> Sequence {
    let mut seq = Sequence::draft(
        "Cold Outreach",
        "Three-touch cold email sequence with stop-on-reply",
    );
    seq.triggers.push(Trigger::Manual);

    seq.steps.push(Step::new(
        "Intro email",
        StepKind::Email {
            subject: "Quick question, {{firstName}}".into(),
            content: "Hi {{firstName}}, noticed {{company}} is growing — worth a chat?".into(),
            personalized: true,
        },
        Timing::immediate(),
    ));

    let stop_on_reply = vec![StepCondition {
        condition_type: ConditionType::IfReplied,
        action: ConditionAction::Stop,
    }];

    seq.steps.push(
        Step::new(
            "Bump",
            StepKind::Email {
                subject: "Re: Quick question".into(),
                content: "Hi {{firstName}}, floating this back up.".into(),
                personalized: true,
            },
            Timing::after(3, DelayUnit::Days),
        )
        .with_conditions(stop_on_reply.clone()),
    );

    seq.steps.push(
        Step::new(
            "Breakup",
            StepKind::Email {
                subject: "Closing the loop".into(),
                content: "Hi {{firstName}}, I'll stop here — reply anytime.".into(),
                personalized: true,
            },
            Timing::after(4, DelayUnit::Days),
        )
        .with_conditions(stop_on_reply),
    );

    seq
}

/// LinkedIn-first multi-channel touch pattern: connection message, wait,
/// email follow-up, then a manual call task for the owner.
pub fn linkedin_multi_touch_template() -> Sequence {
    let mut seq = Sequence::draft(
        "LinkedIn Multi-Touch",
        "Social touch first, email follow-up, call task last",
    );
    seq.triggers.push(Trigger::ListAdded {
        list_id: "prospects".into(),
    });

    seq.steps.push(Step::new(
        "Connection message",
        StepKind::SocialMessage {
            content: "Hi {{firstName}}, we both work in {{industry}} — connecting.".into(),
            personalized: true,
        },
        Timing::immediate(),
    ));

    seq.steps.push(Step::new(
        "Cool-off",
        StepKind::Wait,
        Timing::after(2, DelayUnit::Days),
    ));

    seq.steps.push(
        Step::new(
            "Email follow-up",
            StepKind::Email {
                subject: "Following up from LinkedIn".into(),
                content: "Hi {{firstName}}, sent you a note on LinkedIn too.".into(),
                personalized: true,
            },
            Timing::immediate(),
        )
        .with_conditions(vec![StepCondition {
            condition_type: ConditionType::IfReplied,
            action: ConditionAction::Stop,
        }]),
    );

    seq.steps.push(Step::new(
        "Call task",
        StepKind::Task {
            title: "Call {{firstName}} at {{company}}".into(),
            description: "No reply on LinkedIn or email; try a call.".into(),
            assignee: None,
        },
        Timing::after(3, DelayUnit::Days),
    ));

    seq
}

/// Post-campaign follow-up: thank-you note, then a task if the contact
/// opened but never replied.
pub fn follow_up_template() -> Sequence {
    let mut seq = Sequence::draft(
        "Campaign Follow-Up",
        "Thank-you plus owner task for engaged non-responders",
    );
    seq.triggers.push(Trigger::CampaignCompleted {
        campaign_id: "{{campaignId}}".into(),
    });

    seq.steps.push(Step::new(
        "Thank you",
        StepKind::Email {
            subject: "Thanks, {{firstName}}".into(),
            content: "Appreciate your time — here's the recap we promised.".into(),
            personalized: true,
        },
        Timing::immediate(),
    ));

    let review_task = Step::new(
        "Review engaged contact",
        StepKind::Task {
            title: "Review {{firstName}} ({{company}})".into(),
            description: "Opened but never replied; decide next touch.".into(),
            assignee: None,
        },
        Timing::after(2, DelayUnit::Days),
    );
    let review_id = review_task.id;

    seq.steps.push(
        Step::new(
            "Engagement gate",
            StepKind::Condition {
                condition_type: "if_opened".into(),
                value: "true".into(),
            },
            Timing::after(1, DelayUnit::Days),
        )
        .with_conditions(vec![
            StepCondition {
                condition_type: ConditionType::IfReplied,
                action: ConditionAction::Stop,
            },
            StepCondition {
                condition_type: ConditionType::IfOpened,
                action: ConditionAction::JumpTo {
                    target_step_id: review_id,
                },
            },
        ]),
    );

    seq.steps.push(review_task);

    seq
}
