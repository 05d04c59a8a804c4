pub mod differ;
pub mod fetcher;
pub mod schema;

pub use differ::{diff_submissions, StatusTransition, SubmissionDiff};
pub use fetcher::{check_records, CodePostFetcher, SubmissionFetcher};
pub use schema::{Counts, RecordError, SubmissionRecord, SubmissionState, SubmissionStatus};
