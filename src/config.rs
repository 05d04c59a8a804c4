use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::alert::template::{MessageTemplate, TemplateKind, Templates};
use crate::error::ConfigError;
use crate::snapshot::AssignmentKey;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub channels: BTreeMap<String, String>,
    #[serde(default)]
    pub messages: MessagesConfig,
    #[serde(default)]
    pub sources: Vec<CourseConfig>,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub run: RunConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesConfig {
    #[serde(default = "default_notification_message")]
    pub notification: String,
    #[serde(default = "default_recent_graders_message")]
    pub recent_graders: String,
    #[serde(default = "default_deadline_message")]
    pub deadline: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseConfig {
    pub course: String,
    pub period: String,
    pub channel: String,
    #[serde(default)]
    pub assignments: Vec<AssignmentConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssignmentConfig {
    pub name: String,
    #[serde(default, with = "opt_date")]
    pub start: Option<NaiveDate>,
    #[serde(default, with = "opt_date")]
    pub end: Option<NaiveDate>,
    /// Eastern wall-clock time.
    #[serde(default, with = "opt_minute")]
    pub deadline: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub error_log: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default = "default_platform_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_platform_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotifierKind {
    #[default]
    Slack,
    Webhook,
    Stdout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    #[serde(default)]
    pub kind: NotifierKind,
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_slack_url")]
    pub base_url: String,
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default = "default_notifier_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub data_dir: Option<String>,
    pub max_concurrent: Option<usize>,
    pub notifier_kind: Option<NotifierKind>,
}

impl CourseConfig {
    pub fn course_period(&self) -> String {
        format!("{} {}", self.course, self.period)
    }
}

impl MessagesConfig {
    pub fn compile(&self) -> Result<Templates, ConfigError> {
        let compile = |kind: TemplateKind, raw: &str| {
            MessageTemplate::parse(kind, raw).map_err(|source| ConfigError::Template {
                name: kind.as_str(),
                source,
            })
        };
        Ok(Templates {
            notification: compile(TemplateKind::Notification, &self.notification)?,
            recent_graders: compile(TemplateKind::RecentGraders, &self.recent_graders)?,
            deadline: compile(TemplateKind::Deadline, &self.deadline)?,
        })
    }
}

impl Config {
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config/grading-watch/config.yaml")
    }

    /// Reads and validates the config file. Any problem is fatal for the run.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let parsed = Self::from_yaml(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn from_yaml(data: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(data)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen_courses = BTreeSet::new();
        let mut seen_paths: BTreeMap<String, String> = BTreeMap::new();
        for (index, source) in self.sources.iter().enumerate() {
            for (field, value) in [
                ("course", &source.course),
                ("period", &source.period),
                ("channel", &source.channel),
            ] {
                if value.trim().is_empty() {
                    return Err(ConfigError::EmptyField { index, field });
                }
            }
            let course_period = source.course_period();
            if !seen_courses.insert(course_period.clone()) {
                return Err(ConfigError::DuplicateCourse(course_period));
            }
            if !self.channels.contains_key(&source.channel) {
                return Err(ConfigError::UnknownChannel {
                    channel: source.channel.clone(),
                    course: course_period,
                });
            }

            let mut seen_assignments = BTreeSet::new();
            for assignment in &source.assignments {
                if assignment.name.trim().is_empty() {
                    return Err(ConfigError::EmptyField {
                        index,
                        field: "assignments.name",
                    });
                }
                if !seen_assignments.insert(assignment.name.as_str()) {
                    return Err(ConfigError::DuplicateAssignment {
                        course: course_period,
                        assignment: assignment.name.clone(),
                    });
                }
                let key = AssignmentKey::new(&source.course, &source.period, &assignment.name);
                let path = key.relative_path().to_string_lossy().into_owned();
                // Compared case-insensitively for case-folding filesystems.
                if let Some(first) = seen_paths.insert(path.to_lowercase(), key.to_string()) {
                    return Err(ConfigError::SnapshotCollision {
                        first,
                        second: key.to_string(),
                        path,
                    });
                }
                if let (Some(start), Some(end)) = (assignment.start, assignment.end) {
                    if start > end {
                        return Err(ConfigError::InvertedWindow {
                            course: course_period,
                            assignment: assignment.name.clone(),
                            start,
                            end,
                        });
                    }
                }
            }
        }
        self.messages.compile()?;
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(data_dir) = overrides.data_dir {
            self.storage.data_dir = data_dir;
        }
        if let Some(max_concurrent) = overrides.max_concurrent {
            self.run.max_concurrent = max_concurrent;
        }
        if let Some(kind) = overrides.notifier_kind {
            self.notifier.kind = kind;
        }
    }

    pub fn channel_id(&self, course: &CourseConfig) -> Option<&str> {
        self.channels.get(&course.channel).map(String::as_str)
    }

    pub fn resolved_data_dir(&self) -> PathBuf {
        expand_tilde(&self.storage.data_dir)
    }

    pub fn resolved_error_log(&self) -> Option<PathBuf> {
        self.storage
            .error_log
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(expand_tilde)
    }

    pub fn write_template(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed creating config directory: {}", parent.display())
            })?;
        }
        fs::write(path, Self::default_template())
            .with_context(|| format!("failed writing config template: {}", path.display()))
    }

    pub fn default_template() -> String {
        let template = r#"channels:
  grading: C0123456789

messages:
  notification: "*{assignment}*: {done} done ({finalized} finalized, {drafts} drafts, {unclaimed} left to grade)"
  recent_graders: "Graders who most recently finalized: {graders}"
  deadline: "*{assignment}*: the deadline ({deadline}) has passed. {unclaimed} of {total} submissions are still unclaimed."

sources:
  - course: COS126
    period: F2022
    channel: grading
    assignments:
      - name: Hello World
        start: "2022-09-14"
        end: "2022-09-18"
        deadline: "2022-09-18 23:59"

storage:
  data_dir: ./data
  error_log: ./data/ERRORS.txt

platform:
  base_url: https://api.codepost.io
  api_key_env: CODEPOST_API_KEY
  timeout_secs: 15

notifier:
  kind: slack
  token_env: SLACK_TOKEN
  base_url: https://slack.com/api
  timeout_secs: 10

run:
  max_concurrent: 1
"#;
        template.to_string()
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

mod opt_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    const FMT: &str = "%Y-%m-%d";

    pub fn serialize<S: Serializer>(value: &Option<NaiveDate>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(date) => s.collect_str(&date.format(FMT)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        raw.map(|raw| {
            NaiveDate::parse_from_str(raw.trim(), FMT).map_err(|_| {
                serde::de::Error::custom(format!("invalid date \"{raw}\" (expected YYYY-MM-DD)"))
            })
        })
        .transpose()
    }
}

mod opt_minute {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FMT: &str = "%Y-%m-%d %H:%M";

    pub fn serialize<S: Serializer>(
        value: &Option<NaiveDateTime>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(at) => s.collect_str(&at.format(FMT)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<NaiveDateTime>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        raw.map(|raw| {
            NaiveDateTime::parse_from_str(raw.trim(), FMT).map_err(|_| {
                serde::de::Error::custom(format!(
                    "invalid deadline \"{raw}\" (expected YYYY-MM-DD HH:MM)"
                ))
            })
        })
        .transpose()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channels: BTreeMap::new(),
            messages: MessagesConfig::default(),
            sources: Vec::new(),
            storage: StorageConfig::default(),
            platform: PlatformConfig::default(),
            notifier: NotifierConfig::default(),
            run: RunConfig::default(),
        }
    }
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            notification: default_notification_message(),
            recent_graders: default_recent_graders_message(),
            deadline: default_deadline_message(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            error_log: None,
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: default_platform_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_platform_timeout(),
        }
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            kind: NotifierKind::default(),
            token_env: default_token_env(),
            base_url: default_slack_url(),
            webhook_url: String::new(),
            timeout_secs: default_notifier_timeout(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
        }
    }
}

fn default_notification_message() -> String {
    "*{assignment}*: {done} done ({finalized} finalized, {drafts} drafts, {unclaimed} left to grade)"
        .to_string()
}

fn default_recent_graders_message() -> String {
    "Graders who most recently finalized: {graders}".to_string()
}

fn default_deadline_message() -> String {
    "*{assignment}*: the deadline ({deadline}) has passed. {unclaimed} of {total} submissions are still unclaimed."
        .to_string()
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_platform_url() -> String {
    "https://api.codepost.io".to_string()
}

fn default_api_key_env() -> String {
    "CODEPOST_API_KEY".to_string()
}

fn default_platform_timeout() -> u64 {
    15
}

fn default_token_env() -> String {
    "SLACK_TOKEN".to_string()
}

fn default_slack_url() -> String {
    "https://slack.com/api".to_string()
}

fn default_notifier_timeout() -> u64 {
    10
}

fn default_max_concurrent() -> usize {
    1
}
