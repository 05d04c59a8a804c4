use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::submissions::{Counts, SubmissionState};
use crate::timeutil::Timestamp;

/// Persisted history of one assignment.
///
/// `submissions` maps a submission id to the runs at which its `(status, grader)`
/// changed. A run that is absent for a submission means "same as the latest
/// earlier entry".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AssignmentSnapshot {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub finalized: u64,
    #[serde(default)]
    pub drafts: u64,
    #[serde(default)]
    pub unclaimed: u64,
    #[serde(default)]
    pub sent_deadline_message: Option<Timestamp>,
    #[serde(default)]
    pub runs: BTreeMap<u32, Timestamp>,
    #[serde(default)]
    pub submissions: BTreeMap<String, BTreeMap<u32, SubmissionState>>,
}

impl AssignmentSnapshot {
    pub fn counts(&self) -> Counts {
        Counts {
            total: self.total,
            finalized: self.finalized,
            drafts: self.drafts,
            unclaimed: self.unclaimed,
        }
    }

    pub fn set_counts(&mut self, counts: Counts) {
        self.total = counts.total;
        self.finalized = counts.finalized;
        self.drafts = counts.drafts;
        self.unclaimed = counts.unclaimed;
    }

    pub fn is_baseline(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn latest_run(&self) -> Option<u32> {
        self.runs.keys().next_back().copied()
    }

    pub fn next_run(&self) -> u32 {
        self.latest_run().map(|run| run + 1).unwrap_or(1)
    }

    /// Latest recorded state of every submission, built once per pass.
    pub fn last_known_states(&self) -> BTreeMap<&str, &SubmissionState> {
        self.submissions
            .iter()
            .filter_map(|(id, history)| {
                history
                    .values()
                    .next_back()
                    .map(|state| (id.as_str(), state))
            })
            .collect()
    }

    /// State of a submission as of `run`, following carry-forward semantics.
    pub fn state_at(&self, submission_id: &str, run: u32) -> Option<&SubmissionState> {
        self.submissions
            .get(submission_id)?
            .range(..=run)
            .next_back()
            .map(|(_, state)| state)
    }
}
