use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Unclaimed,
    Draft,
    Finalized,
    Deleted,
}

impl SubmissionStatus {
    pub const ALL: [SubmissionStatus; 4] = [
        SubmissionStatus::Unclaimed,
        SubmissionStatus::Draft,
        SubmissionStatus::Finalized,
        SubmissionStatus::Deleted,
    ];

    pub fn as_slug(&self) -> &'static str {
        match self {
            Self::Unclaimed => "unclaimed",
            Self::Draft => "draft",
            Self::Finalized => "finalized",
            Self::Deleted => "deleted",
        }
    }

    /// Draft and finalized submissions always carry a grader; the others never do.
    pub fn requires_grader(&self) -> bool {
        matches!(self, Self::Draft | Self::Finalized)
    }
}

impl Display for SubmissionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_slug())
    }
}

#[derive(Debug, Error)]
#[error("unknown submission status: {0}")]
pub struct StatusParseError(pub String);

impl FromStr for SubmissionStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unclaimed" => Ok(Self::Unclaimed),
            "draft" | "drafts" => Ok(Self::Draft),
            "finalized" => Ok(Self::Finalized),
            "deleted" => Ok(Self::Deleted),
            _ => Err(StatusParseError(s.to_string())),
        }
    }
}

/// One `(status, grader)` observation as stored in the snapshot history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmissionState {
    pub status: SubmissionStatus,
    pub grader: Option<String>,
}

impl SubmissionState {
    pub fn new(status: SubmissionStatus, grader: Option<String>) -> Self {
        let grader = if status.requires_grader() {
            grader
        } else {
            None
        };
        Self { status, grader }
    }
}

/// A raw submission as reported by the grading platform for the current pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmissionRecord {
    pub submission_id: String,
    pub status: SubmissionStatus,
    pub grader: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("submission {id} is {status} but has no grader")]
    MissingGrader { id: String, status: SubmissionStatus },
    #[error("submission with an empty id")]
    EmptyId,
}

impl SubmissionRecord {
    pub fn new(
        submission_id: impl Into<String>,
        status: SubmissionStatus,
        grader: Option<&str>,
    ) -> Self {
        Self {
            submission_id: submission_id.into(),
            status,
            grader: grader.map(str::to_string),
        }
    }

    pub fn validate(&self) -> Result<(), RecordError> {
        if self.submission_id.trim().is_empty() {
            return Err(RecordError::EmptyId);
        }
        let has_grader = self
            .grader
            .as_deref()
            .map(|g| !g.trim().is_empty())
            .unwrap_or(false);
        if self.status.requires_grader() && !has_grader {
            return Err(RecordError::MissingGrader {
                id: self.submission_id.clone(),
                status: self.status,
            });
        }
        Ok(())
    }

    pub fn state(&self) -> SubmissionState {
        SubmissionState::new(self.status, self.grader.clone())
    }
}

/// Tally of non-deleted submissions; `finalized + drafts + unclaimed == total` always holds.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Counts {
    pub total: u64,
    pub finalized: u64,
    pub drafts: u64,
    pub unclaimed: u64,
}

impl Counts {
    pub fn tally(statuses: impl IntoIterator<Item = SubmissionStatus>) -> Self {
        let mut counts = Self::default();
        for status in statuses {
            match status {
                SubmissionStatus::Finalized => counts.finalized += 1,
                SubmissionStatus::Draft => counts.drafts += 1,
                SubmissionStatus::Unclaimed => counts.unclaimed += 1,
                SubmissionStatus::Deleted => continue,
            }
            counts.total += 1;
        }
        counts
    }

    pub fn is_consistent(&self) -> bool {
        self.finalized + self.drafts + self.unclaimed == self.total
    }

    /// Finalized share of the total in percent; zero when there is nothing to grade.
    pub fn done_percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.finalized as f64 / self.total as f64) * 100.0
    }
}
