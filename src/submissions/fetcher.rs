use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::http::{build_client, fetch_json};
use crate::submissions::schema::{SubmissionRecord, SubmissionStatus};

/// Source of raw submission records for one assignment.
#[async_trait]
pub trait SubmissionFetcher: Send + Sync {
    async fn fetch_submissions(
        &self,
        course: &str,
        period: &str,
        assignment: &str,
    ) -> Result<Vec<SubmissionRecord>, FetchError>;

    /// Names of the assignments the platform knows for a course.
    async fn list_assignments(&self, course: &str, period: &str) -> Result<Vec<String>, FetchError>;
}

#[derive(Debug, Clone, Deserialize)]
struct CourseDto {
    id: u64,
    name: String,
    period: String,
    #[serde(default)]
    assignments: Vec<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct AssignmentDto {
    id: u64,
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SubmissionDto {
    id: u64,
    #[serde(default)]
    grader: Option<String>,
    #[serde(rename = "isFinalized", default)]
    is_finalized: bool,
    #[serde(rename = "isDeleted", default)]
    is_deleted: bool,
}

impl SubmissionDto {
    fn into_record(self) -> SubmissionRecord {
        let grader = self.grader.filter(|g| !g.trim().is_empty());
        let status = if self.is_deleted {
            SubmissionStatus::Deleted
        } else if self.is_finalized {
            SubmissionStatus::Finalized
        } else if grader.is_some() {
            SubmissionStatus::Draft
        } else {
            SubmissionStatus::Unclaimed
        };
        SubmissionRecord {
            submission_id: self.id.to_string(),
            status,
            grader,
        }
    }
}

/// codePost REST client. Each call is a single attempt bounded by the client timeout.
pub struct CodePostFetcher {
    client: Client,
    base_url: String,
    api_key: String,
}

impl CodePostFetcher {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, FetchError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = build_client(timeout_secs).map_err(|source| FetchError::Request {
            url: base_url.clone(),
            source,
        })?;
        Ok(Self {
            client,
            base_url,
            api_key: api_key.into(),
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {url}");
        let request = self
            .client
            .get(&url)
            .header("Authorization", format!("Token {}", self.api_key));
        fetch_json(request, &url).await
    }

    async fn find_course(&self, course: &str, period: &str) -> Result<CourseDto, FetchError> {
        let courses: Vec<CourseDto> = self.get("/courses/").await?;
        let mut matches = courses
            .into_iter()
            .filter(|c| c.name == course && c.period == period);
        let found = matches.next().ok_or_else(|| {
            FetchError::NotFound(format!("course \"{course}\" with period \"{period}\""))
        })?;
        if matches.next().is_some() {
            warn!("multiple courses named \"{course}\" with period \"{period}\", using id {}", found.id);
        }
        Ok(found)
    }

    async fn course_assignments(&self, course: &CourseDto) -> Result<Vec<AssignmentDto>, FetchError> {
        let mut out = Vec::with_capacity(course.assignments.len());
        for id in &course.assignments {
            out.push(self.get(&format!("/assignments/{id}/")).await?);
        }
        Ok(out)
    }
}

#[async_trait]
impl SubmissionFetcher for CodePostFetcher {
    async fn fetch_submissions(
        &self,
        course: &str,
        period: &str,
        assignment: &str,
    ) -> Result<Vec<SubmissionRecord>, FetchError> {
        let course_dto = self.find_course(course, period).await?;
        let target = self
            .course_assignments(&course_dto)
            .await?
            .into_iter()
            .find(|a| a.name == assignment)
            .ok_or_else(|| {
                FetchError::NotFound(format!(
                    "course \"{course} {period}\" does not have an assignment called \"{assignment}\""
                ))
            })?;
        let submissions: Vec<SubmissionDto> = self
            .get(&format!("/assignments/{}/submissions/", target.id))
            .await?;
        Ok(submissions.into_iter().map(SubmissionDto::into_record).collect())
    }

    async fn list_assignments(&self, course: &str, period: &str) -> Result<Vec<String>, FetchError> {
        let course_dto = self.find_course(course, period).await?;
        Ok(self
            .course_assignments(&course_dto)
            .await?
            .into_iter()
            .map(|a| a.name)
            .collect())
    }
}

/// Rejects records that would break snapshot invariants. Any bad record
/// fails the whole fetch so no partial state is persisted.
pub fn check_records(records: &[SubmissionRecord]) -> Result<(), FetchError> {
    for record in records {
        record
            .validate()
            .map_err(|e| FetchError::Malformed(e.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dto(json: &str) -> SubmissionDto {
        serde_json::from_str(json).expect("valid dto")
    }

    #[test]
    fn maps_codepost_flags_to_status() {
        let finalized = dto(r#"{"id": 1, "grader": "a@x.edu", "isFinalized": true}"#).into_record();
        assert_eq!(finalized.status, SubmissionStatus::Finalized);
        assert_eq!(finalized.submission_id, "1");

        let draft = dto(r#"{"id": 2, "grader": "a@x.edu", "isFinalized": false}"#).into_record();
        assert_eq!(draft.status, SubmissionStatus::Draft);

        let unclaimed = dto(r#"{"id": 3, "grader": null, "isFinalized": false}"#).into_record();
        assert_eq!(unclaimed.status, SubmissionStatus::Unclaimed);
        assert!(unclaimed.grader.is_none());

        let blank = dto(r#"{"id": 4, "grader": "  "}"#).into_record();
        assert_eq!(blank.status, SubmissionStatus::Unclaimed);

        let deleted = dto(r#"{"id": 5, "grader": "a@x.edu", "isDeleted": true}"#).into_record();
        assert_eq!(deleted.status, SubmissionStatus::Deleted);
    }

    #[test]
    fn check_records_flags_missing_grader() {
        let records = vec![
            SubmissionRecord::new("1", SubmissionStatus::Unclaimed, None),
            SubmissionRecord::new("2", SubmissionStatus::Draft, None),
        ];
        assert!(matches!(
            check_records(&records),
            Err(FetchError::Malformed(_))
        ));
        assert!(check_records(&records[..1]).is_ok());
    }

    #[test]
    fn trims_trailing_slash_from_base_url() {
        let fetcher = CodePostFetcher::new("http://127.0.0.1:9/", "key", 1).expect("client");
        assert_eq!(fetcher.base_url, "http://127.0.0.1:9");
    }
}
