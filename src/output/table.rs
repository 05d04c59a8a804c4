use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Row, Table};

use crate::report::{AssignmentOutcome, RunReport};
use crate::snapshot::AssignmentSnapshot;
use crate::timeutil::EASTERN;

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn render_report_table(report: &RunReport) -> String {
    let mut table = new_table();
    table.set_header(vec![
        "Course",
        "Assignment",
        "Outcome",
        "Run",
        "Done",
        "Finalized",
        "Drafts",
        "Unclaimed",
        "Messages",
    ]);

    for entry in &report.assignments {
        let outcome_cell = match &entry.outcome {
            AssignmentOutcome::OutsideWindow => Cell::new(entry.outcome.label()).fg(Color::DarkGrey),
            AssignmentOutcome::FetchFailed { .. } => Cell::new(entry.outcome.label()).fg(Color::Red),
            AssignmentOutcome::Processed { .. } if !entry.errors().is_empty() => {
                Cell::new(entry.outcome.label()).fg(Color::Yellow)
            }
            AssignmentOutcome::Processed { .. } => Cell::new(entry.outcome.label()).fg(Color::Green),
        };
        let mut cells = vec![
            Cell::new(&entry.course),
            Cell::new(&entry.assignment),
            outcome_cell,
        ];
        match &entry.outcome {
            AssignmentOutcome::Processed {
                run,
                baseline,
                counts,
                notifications,
                ..
            } => {
                let run = if *baseline {
                    format!("{run} (baseline)")
                } else {
                    run.to_string()
                };
                let messages = notifications
                    .iter()
                    .map(|n| {
                        let mark = if n.delivered { "sent" } else { "failed" };
                        format!("{:?}: {mark}", n.kind).to_lowercase()
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                cells.extend([
                    Cell::new(run),
                    Cell::new(format!("{:.2}%", counts.done_percent())),
                    Cell::new(counts.finalized),
                    Cell::new(counts.drafts),
                    Cell::new(counts.unclaimed),
                    Cell::new(if messages.is_empty() { "-".to_string() } else { messages }),
                ]);
            }
            AssignmentOutcome::FetchFailed { error } => {
                cells.extend(["-", "-", "-", "-", "-"].map(Cell::new));
                cells.push(Cell::new(error));
            }
            AssignmentOutcome::OutsideWindow => {
                cells.extend(["-", "-", "-", "-", "-", "-"].map(Cell::new));
            }
        }
        table.add_row(Row::from(cells));
    }
    table.to_string()
}

/// Counts, run history, and the current state of every submission.
pub fn render_snapshot_tables(snapshot: &AssignmentSnapshot) -> String {
    let counts = snapshot.counts();
    let mut summary = new_table();
    summary.set_header(vec!["Total", "Finalized", "Drafts", "Unclaimed", "Done", "Deadline Message"]);
    summary.add_row(vec![
        counts.total.to_string(),
        counts.finalized.to_string(),
        counts.drafts.to_string(),
        counts.unclaimed.to_string(),
        format!("{:.2}%", counts.done_percent()),
        snapshot
            .sent_deadline_message
            .map(|ts| format!("sent {}", eastern(ts)))
            .unwrap_or_else(|| "-".to_string()),
    ]);

    let mut runs = new_table();
    runs.set_header(vec!["Run", "Observed (Eastern)", "Changes"]);
    for (run, at) in &snapshot.runs {
        let changes = snapshot
            .submissions
            .values()
            .filter(|history| history.contains_key(run))
            .count();
        runs.add_row(vec![run.to_string(), eastern(*at), changes.to_string()]);
    }

    let mut submissions = new_table();
    submissions.set_header(vec!["Submission", "Status", "Grader", "Since Run"]);
    for (id, history) in &snapshot.submissions {
        let Some((since, state)) = history.iter().next_back() else {
            continue;
        };
        submissions.add_row(vec![
            id.clone(),
            state.status.to_string(),
            state.grader.clone().unwrap_or_else(|| "-".to_string()),
            since.to_string(),
        ]);
    }

    format!("{summary}\n{runs}\n{submissions}")
}

fn eastern(ts: crate::timeutil::Timestamp) -> String {
    ts.as_utc()
        .with_timezone(&EASTERN)
        .format("%Y-%m-%d %H:%M:%S %Z")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::NotificationKind;
    use crate::report::{AssignmentReport, DeliveryReport};
    use crate::submissions::{Counts, SubmissionState, SubmissionStatus};

    #[test]
    fn report_table_lists_every_assignment() {
        let report = RunReport {
            started_at: "2022-09-16 16:00:00".parse().unwrap(),
            assignments: vec![
                AssignmentReport {
                    course: "COS126 F2022".into(),
                    assignment: "Hello".into(),
                    outcome: AssignmentOutcome::Processed {
                        run: 2,
                        baseline: false,
                        counts: Counts {
                            total: 3,
                            finalized: 2,
                            drafts: 0,
                            unclaimed: 1,
                        },
                        notifications: vec![DeliveryReport {
                            kind: NotificationKind::Progress,
                            delivered: true,
                            error: None,
                        }],
                        persisted: true,
                        save_error: None,
                    },
                },
                AssignmentReport {
                    course: "COS126 F2022".into(),
                    assignment: "Loops".into(),
                    outcome: AssignmentOutcome::OutsideWindow,
                },
            ],
        };
        let out = render_report_table(&report);
        assert!(out.contains("Hello"));
        assert!(out.contains("66.67%"));
        assert!(out.contains("progress: sent"));
        assert!(out.contains("Loops"));
        assert!(out.contains("skipped"));
    }

    #[test]
    fn snapshot_tables_show_current_state() {
        let mut snapshot = AssignmentSnapshot {
            total: 1,
            finalized: 1,
            ..Default::default()
        };
        snapshot
            .runs
            .insert(1, "2022-09-16 16:00:00".parse().unwrap());
        snapshot
            .runs
            .insert(2, "2022-09-16 16:30:00".parse().unwrap());
        let history = snapshot.submissions.entry("7".into()).or_default();
        history.insert(1, SubmissionState::new(SubmissionStatus::Unclaimed, None));
        history.insert(
            2,
            SubmissionState::new(SubmissionStatus::Finalized, Some("a@x.edu".into())),
        );

        let out = render_snapshot_tables(&snapshot);
        assert!(out.contains("100.00%"));
        assert!(out.contains("2022-09-16 12:00:00 EDT"));
        assert!(out.contains("a@x.edu"));
        assert!(out.contains("finalized"));
    }
}
