use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::snapshot::AssignmentSnapshot;
use crate::submissions::schema::{Counts, SubmissionRecord, SubmissionState, SubmissionStatus};
use crate::timeutil::Timestamp;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusTransition {
    pub submission_id: String,
    pub from: Option<SubmissionState>,
    pub to: SubmissionState,
}

impl StatusTransition {
    pub fn is_newly_finalized(&self) -> bool {
        self.to.status == SubmissionStatus::Finalized
            && self.from.as_ref().map(|s| s.status) != Some(SubmissionStatus::Finalized)
    }
}

/// Delta between the stored snapshot and a fresh fetch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmissionDiff {
    pub run: u32,
    pub observed_at: Timestamp,
    pub previous_counts: Counts,
    pub counts: Counts,
    pub counts_changed: bool,
    /// No run had been recorded before this one.
    pub baseline: bool,
    pub transitions: Vec<StatusTransition>,
    pub newly_finalized_graders: BTreeSet<String>,
}

pub fn diff_submissions(
    previous: &AssignmentSnapshot,
    records: &[SubmissionRecord],
    observed_at: Timestamp,
) -> SubmissionDiff {
    let last_known = previous.last_known_states();
    let mut seen = HashSet::new();
    let mut statuses = Vec::with_capacity(records.len());
    let mut transitions = Vec::new();

    for record in records {
        if !seen.insert(record.submission_id.as_str()) {
            warn!(
                submission = record.submission_id.as_str(),
                "duplicate submission in fetch, keeping first"
            );
            continue;
        }
        statuses.push(record.status);

        let current = record.state();
        let prior = last_known.get(record.submission_id.as_str()).copied();
        if prior != Some(&current) {
            transitions.push(StatusTransition {
                submission_id: record.submission_id.clone(),
                from: prior.cloned(),
                to: current,
            });
        }
    }

    let previous_counts = previous.counts();
    let counts = Counts::tally(statuses);
    let newly_finalized_graders = transitions
        .iter()
        .filter(|t| t.is_newly_finalized())
        .filter_map(|t| t.to.grader.clone())
        .collect();

    SubmissionDiff {
        run: previous.next_run(),
        observed_at,
        previous_counts,
        counts,
        counts_changed: counts != previous_counts,
        baseline: previous.is_baseline(),
        transitions,
        newly_finalized_graders,
    }
}

impl SubmissionDiff {
    /// Produces the snapshot that records this run. Only transitions are
    /// written, which keeps the per-submission history compact.
    pub fn apply_to(&self, previous: &AssignmentSnapshot) -> AssignmentSnapshot {
        let mut next = previous.clone();
        next.set_counts(self.counts);
        next.runs.insert(self.run, self.observed_at);
        for transition in &self.transitions {
            next.submissions
                .entry(transition.submission_id.clone())
                .or_default()
                .insert(self.run, transition.to.clone());
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submissions::SubmissionStatus::{Deleted, Draft, Finalized, Unclaimed};

    fn ts(raw: &str) -> Timestamp {
        raw.parse().expect("valid timestamp")
    }

    fn fetch_a() -> Vec<SubmissionRecord> {
        vec![
            SubmissionRecord::new("1", Finalized, Some("b@x.edu")),
            SubmissionRecord::new("2", Draft, Some("a@x.edu")),
            SubmissionRecord::new("3", Unclaimed, None),
        ]
    }

    #[test]
    fn first_run_is_baseline_and_records_everything() {
        let previous = AssignmentSnapshot::default();
        let diff = diff_submissions(&previous, &fetch_a(), ts("2023-02-01 10:00:00"));
        assert!(diff.baseline);
        assert_eq!(diff.run, 1);
        assert_eq!(diff.transitions.len(), 3);
        assert!(diff.counts.is_consistent());

        let next = diff.apply_to(&previous);
        assert_eq!(next.runs.len(), 1);
        assert_eq!(next.submissions.len(), 3);
        assert_eq!(next.counts(), diff.counts);
    }

    #[test]
    fn identical_fetch_only_allocates_a_run() {
        let first = diff_submissions(
            &AssignmentSnapshot::default(),
            &fetch_a(),
            ts("2023-02-01 10:00:00"),
        );
        let stored = first.apply_to(&AssignmentSnapshot::default());

        let second = diff_submissions(&stored, &fetch_a(), ts("2023-02-01 10:30:00"));
        assert_eq!(second.run, 2);
        assert!(!second.baseline);
        assert!(second.transitions.is_empty());
        assert!(!second.counts_changed);

        let next = second.apply_to(&stored);
        assert_eq!(next.runs.len(), 2);
        assert_eq!(next.submissions, stored.submissions);
    }

    #[test]
    fn draft_finalized_reports_grader_once() {
        let stored = diff_submissions(
            &AssignmentSnapshot::default(),
            &fetch_a(),
            ts("2023-02-01 10:00:00"),
        )
        .apply_to(&AssignmentSnapshot::default());

        let records = vec![
            SubmissionRecord::new("1", Finalized, Some("b@x.edu")),
            SubmissionRecord::new("2", Finalized, Some("a@x.edu")),
            SubmissionRecord::new("3", Unclaimed, None),
        ];
        let diff = diff_submissions(&stored, &records, ts("2023-02-01 10:30:00"));
        assert_eq!(
            diff.counts,
            Counts {
                total: 3,
                finalized: 2,
                drafts: 0,
                unclaimed: 1
            }
        );
        assert!(diff.counts_changed);
        assert_eq!(
            diff.newly_finalized_graders.iter().collect::<Vec<_>>(),
            vec!["a@x.edu"]
        );
        assert_eq!(diff.transitions.len(), 1);
        assert_eq!(diff.transitions[0].submission_id, "2");
    }

    #[test]
    fn regrade_by_another_grader_is_a_transition_but_not_newly_finalized() {
        let stored = diff_submissions(
            &AssignmentSnapshot::default(),
            &fetch_a(),
            ts("2023-02-01 10:00:00"),
        )
        .apply_to(&AssignmentSnapshot::default());
        let mut records = fetch_a();
        records[0].grader = Some("c@x.edu".into());

        let diff = diff_submissions(&stored, &records, ts("2023-02-01 10:30:00"));
        assert_eq!(diff.transitions.len(), 1);
        assert!(diff.newly_finalized_graders.is_empty());
        assert!(!diff.counts_changed);
    }

    #[test]
    fn compares_against_last_entry_across_all_runs() {
        // Submission 3 changed at run 1 only; runs 2 and 3 carried it forward.
        let mut stored = diff_submissions(
            &AssignmentSnapshot::default(),
            &fetch_a(),
            ts("2023-02-01 10:00:00"),
        )
        .apply_to(&AssignmentSnapshot::default());
        for (i, at) in ["2023-02-01 10:30:00", "2023-02-01 11:00:00"].iter().enumerate() {
            let mut records = fetch_a();
            records[1].status = if i == 0 { Finalized } else { Draft };
            stored = diff_submissions(&stored, &records, ts(at)).apply_to(&stored);
        }
        assert_eq!(stored.submissions["3"].len(), 1);
        assert_eq!(stored.submissions["2"].len(), 3);

        let diff = diff_submissions(&stored, &fetch_a(), ts("2023-02-01 11:30:00"));
        assert_eq!(diff.run, 4);
        assert!(diff.transitions.is_empty());
    }

    #[test]
    fn deleted_is_tracked_but_not_counted() {
        let stored = diff_submissions(
            &AssignmentSnapshot::default(),
            &fetch_a(),
            ts("2023-02-01 10:00:00"),
        )
        .apply_to(&AssignmentSnapshot::default());
        let records = vec![
            SubmissionRecord::new("1", Finalized, Some("b@x.edu")),
            SubmissionRecord::new("2", Deleted, Some("a@x.edu")),
            SubmissionRecord::new("3", Unclaimed, None),
        ];
        let diff = diff_submissions(&stored, &records, ts("2023-02-01 10:30:00"));
        assert_eq!(diff.counts.total, 2);
        assert!(diff.counts.is_consistent());
        let next = diff.apply_to(&stored);
        let entry = &next.submissions["2"][&2];
        assert_eq!(entry.status, Deleted);
        assert_eq!(entry.grader, None);
    }

    #[test]
    fn vanished_submissions_keep_their_history() {
        let stored = diff_submissions(
            &AssignmentSnapshot::default(),
            &fetch_a(),
            ts("2023-02-01 10:00:00"),
        )
        .apply_to(&AssignmentSnapshot::default());
        let diff = diff_submissions(&stored, &fetch_a()[..1], ts("2023-02-01 10:30:00"));
        let next = diff.apply_to(&stored);
        assert_eq!(next.submissions.len(), 3);
        assert_eq!(next.total, 1);
    }

    #[test]
    fn empty_fetch_zeroes_counts_without_entries() {
        let diff = diff_submissions(
            &AssignmentSnapshot::default(),
            &[],
            ts("2023-02-01 10:00:00"),
        );
        assert_eq!(diff.counts, Counts::default());
        assert!(!diff.counts_changed);
        let next = diff.apply_to(&AssignmentSnapshot::default());
        assert!(next.submissions.is_empty());
        assert_eq!(next.runs.len(), 1);
    }

    #[test]
    fn duplicate_ids_count_once() {
        let mut records = fetch_a();
        records.push(SubmissionRecord::new("3", Draft, Some("z@x.edu")));
        let diff = diff_submissions(
            &AssignmentSnapshot::default(),
            &records,
            ts("2023-02-01 10:00:00"),
        );
        assert_eq!(diff.counts.total, 3);
        assert_eq!(diff.counts.unclaimed, 1);
    }
}
