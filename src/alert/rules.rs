use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AssignmentConfig;
use crate::timeutil::{eastern_date, eastern_to_utc, Timestamp};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Progress,
    Deadline,
}

/// Inclusive Eastern-date window check. Open ends always match.
pub fn date_in_window(today: NaiveDate, start: Option<NaiveDate>, end: Option<NaiveDate>) -> bool {
    start.map(|s| s <= today).unwrap_or(true) && end.map(|e| today <= e).unwrap_or(true)
}

pub fn within_window(assignment: &AssignmentConfig, now: DateTime<Utc>) -> bool {
    date_in_window(eastern_date(now), assignment.start, assignment.end)
}

/// The deadline message is due once the Eastern deadline has passed, and only
/// while no earlier pass has recorded sending it.
pub fn deadline_due(
    assignment: &AssignmentConfig,
    sent_deadline_message: Option<Timestamp>,
    now: DateTime<Utc>,
) -> bool {
    let Some(deadline) = assignment.deadline else {
        return false;
    };
    sent_deadline_message.is_none() && now >= eastern_to_utc(deadline)
}
