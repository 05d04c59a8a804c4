use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alert::rules::{deadline_due, NotificationKind};
use crate::alert::template::{format_graders, TemplateVars, Templates};
use crate::config::AssignmentConfig;
use crate::submissions::SubmissionDiff;
use crate::timeutil::Timestamp;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub text: String,
}

/// Decides which messages one assignment produces in this pass.
///
/// Progress messages need a change in counts against an earlier run; the
/// baseline run is silent. Deadline messages depend only on the clock and
/// on whether one was already sent.
pub fn evaluate_notifications(
    assignment: &AssignmentConfig,
    diff: &SubmissionDiff,
    sent_deadline_message: Option<Timestamp>,
    now: DateTime<Utc>,
    templates: &Templates,
) -> Vec<Notification> {
    let mut out = Vec::new();
    let mut vars = TemplateVars {
        assignment: assignment.name.as_str(),
        counts: diff.counts,
        ..Default::default()
    };

    if diff.counts_changed && !diff.baseline {
        let mut text = templates.notification.render(&vars);
        if !diff.newly_finalized_graders.is_empty() {
            vars.graders = format_graders(diff.newly_finalized_graders.iter().map(String::as_str));
            text.push('\n');
            text.push_str(&templates.recent_graders.render(&vars));
        }
        out.push(Notification {
            kind: NotificationKind::Progress,
            text,
        });
    }

    if deadline_due(assignment, sent_deadline_message, now) {
        vars.deadline = assignment
            .deadline
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        out.push(Notification {
            kind: NotificationKind::Deadline,
            text: templates.deadline.render(&vars),
        });
    }

    out
}
