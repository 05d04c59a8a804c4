use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::alert::NotificationKind;
use crate::submissions::Counts;
use crate::timeutil::Timestamp;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DeliveryReport {
    pub kind: NotificationKind,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AssignmentOutcome {
    OutsideWindow,
    FetchFailed {
        error: String,
    },
    Processed {
        run: u32,
        baseline: bool,
        counts: Counts,
        notifications: Vec<DeliveryReport>,
        persisted: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        save_error: Option<String>,
    },
}

impl AssignmentOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::OutsideWindow => "skipped",
            Self::FetchFailed { .. } => "fetch failed",
            Self::Processed { .. } => "processed",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AssignmentReport {
    pub course: String,
    pub assignment: String,
    #[serde(flatten)]
    pub outcome: AssignmentOutcome,
}

impl AssignmentReport {
    /// Human-readable error lines for this assignment, if any.
    pub fn errors(&self) -> Vec<String> {
        let prefix = format!("{} / {}", self.course, self.assignment);
        match &self.outcome {
            AssignmentOutcome::OutsideWindow => Vec::new(),
            AssignmentOutcome::FetchFailed { error } => vec![format!("{prefix}: {error}")],
            AssignmentOutcome::Processed {
                run,
                notifications,
                save_error,
                ..
            } => {
                let mut out: Vec<String> = notifications
                    .iter()
                    .filter_map(|n| {
                        n.error.as_ref().map(|e| {
                            format!("{prefix} (run {run}): failed sending {:?} message: {e}", n.kind)
                        })
                    })
                    .collect();
                if let Some(e) = save_error {
                    out.push(format!("{prefix} (run {run}): failed saving snapshot: {e}"));
                }
                out
            }
        }
    }
}

/// Everything one pass did, in config-declaration order.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RunReport {
    pub started_at: Timestamp,
    pub assignments: Vec<AssignmentReport>,
}

impl RunReport {
    pub fn errors(&self) -> Vec<String> {
        self.assignments.iter().flat_map(|a| a.errors()).collect()
    }

    pub fn find(&self, course: &str, assignment: &str) -> Option<&AssignmentReport> {
        self.assignments
            .iter()
            .find(|a| a.course == course && a.assignment == assignment)
    }

    pub fn summary(&self) -> String {
        let mut processed = 0;
        let mut skipped = 0;
        let mut failed = 0;
        for report in &self.assignments {
            match report.outcome {
                AssignmentOutcome::OutsideWindow => skipped += 1,
                AssignmentOutcome::FetchFailed { .. } => failed += 1,
                AssignmentOutcome::Processed { .. } => processed += 1,
            }
        }
        format!(
            "{processed} processed, {skipped} outside window, {failed} failed, {} errors",
            self.errors().len()
        )
    }
}

/// Appends `[timestamp] message` lines to the error log, creating it if needed.
pub fn append_error_log(path: &Path, at: Timestamp, messages: &[String]) -> std::io::Result<()> {
    if messages.is_empty() {
        return Ok(());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    for message in messages {
        writeln!(file, "[{at}] {message}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn report() -> RunReport {
        RunReport {
            started_at: "2022-09-16 16:00:00".parse().unwrap(),
            assignments: vec![
                AssignmentReport {
                    course: "COS126 F2022".into(),
                    assignment: "Hello".into(),
                    outcome: AssignmentOutcome::OutsideWindow,
                },
                AssignmentReport {
                    course: "COS126 F2022".into(),
                    assignment: "Loops".into(),
                    outcome: AssignmentOutcome::FetchFailed {
                        error: "not found: assignment".into(),
                    },
                },
                AssignmentReport {
                    course: "COS126 F2022".into(),
                    assignment: "NBody".into(),
                    outcome: AssignmentOutcome::Processed {
                        run: 4,
                        baseline: false,
                        counts: Counts::default(),
                        notifications: vec![DeliveryReport {
                            kind: NotificationKind::Progress,
                            delivered: false,
                            error: Some("channel_not_found".into()),
                        }],
                        persisted: true,
                        save_error: None,
                    },
                },
            ],
        }
    }

    #[test]
    fn collects_errors_per_assignment() {
        let errors = report().errors();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0], "COS126 F2022 / Loops: not found: assignment");
        assert!(errors[1].starts_with("COS126 F2022 / NBody (run 4)"));
        assert!(errors[1].contains("channel_not_found"));
        assert_eq!(
            report().summary(),
            "1 processed, 1 outside window, 1 failed, 2 errors"
        );
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let json = serde_json::to_value(&report().assignments[1]).unwrap();
        assert_eq!(json["outcome"], "fetch_failed");
        assert_eq!(json["assignment"], "Loops");
    }

    #[test]
    fn error_log_appends_timestamped_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs/ERRORS.txt");
        let at: Timestamp = "2022-09-16 16:00:00".parse().unwrap();
        append_error_log(&path, at, &["first".to_string()]).unwrap();
        append_error_log(&path, at, &["second".to_string()]).unwrap();
        append_error_log(&path, at, &[]).unwrap();
        let body = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            body,
            "[2022-09-16 16:00:00.000000] first\n[2022-09-16 16:00:00.000000] second\n"
        );
    }
}
