use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::alert::{
    evaluate_notifications, within_window, Notification, NotificationKind, Notifier, Templates,
};
use crate::config::{AssignmentConfig, Config, CourseConfig};
use crate::error::{ConfigError, DeliveryError};
use crate::report::{AssignmentOutcome, AssignmentReport, DeliveryReport, RunReport};
use crate::snapshot::{AssignmentKey, SnapshotStore};
use crate::submissions::{check_records, diff_submissions, SubmissionFetcher};
use crate::timeutil::Timestamp;

/// Drives one pass over every configured assignment.
pub struct Runner {
    sources: Vec<CourseConfig>,
    channels: BTreeMap<String, String>,
    templates: Templates,
    store: SnapshotStore,
    fetcher: Arc<dyn SubmissionFetcher>,
    notifier: Arc<dyn Notifier>,
    max_concurrent: usize,
    persist: bool,
}

impl Runner {
    pub fn new(
        config: &Config,
        store: SnapshotStore,
        fetcher: Arc<dyn SubmissionFetcher>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            sources: config.sources.clone(),
            channels: config.channels.clone(),
            templates: config.messages.compile()?,
            store,
            fetcher,
            notifier,
            max_concurrent: config.run.max_concurrent.max(1),
            persist: true,
        })
    }

    /// Keeps snapshots untouched on disk; used for dry runs.
    pub fn without_persistence(mut self) -> Self {
        self.persist = false;
        self
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub async fn run_pass(&self, now: DateTime<Utc>) -> RunReport {
        let jobs: Vec<(&CourseConfig, &AssignmentConfig)> = self
            .sources
            .iter()
            .flat_map(|course| course.assignments.iter().map(move |a| (course, a)))
            .collect();
        info!(
            assignments = jobs.len(),
            max_concurrent = self.max_concurrent,
            notifier = self.notifier.name(),
            "starting pass"
        );

        let assignments = stream::iter(jobs)
            .map(|(course, assignment)| self.process_assignment(course, assignment, now))
            .buffered(self.max_concurrent)
            .collect::<Vec<_>>()
            .await;

        let report = RunReport {
            started_at: Timestamp::from_utc(now),
            assignments,
        };
        info!("pass finished: {}", report.summary());
        report
    }

    async fn process_assignment(
        &self,
        course: &CourseConfig,
        assignment: &AssignmentConfig,
        now: DateTime<Utc>,
    ) -> AssignmentReport {
        let course_period = course.course_period();
        let report = |outcome| AssignmentReport {
            course: course_period.clone(),
            assignment: assignment.name.clone(),
            outcome,
        };

        if !within_window(assignment, now) {
            info!(
                course = %course_period,
                assignment = %assignment.name,
                "outside grading window, skipped"
            );
            return report(AssignmentOutcome::OutsideWindow);
        }

        let key = AssignmentKey::new(&course.course, &course.period, &assignment.name);
        let previous = if self.persist {
            self.store.load(&key)
        } else {
            self.store.load_untouched(&key)
        };
        let run = previous.next_run();

        let fetched = self
            .fetcher
            .fetch_submissions(&course.course, &course.period, &assignment.name)
            .await
            .and_then(|records| check_records(&records).map(|_| records));
        let records = match fetched {
            Ok(records) => records,
            Err(err) => {
                warn!(
                    course = %course_period,
                    assignment = %assignment.name,
                    run,
                    "fetch failed, snapshot left untouched: {err}"
                );
                return report(AssignmentOutcome::FetchFailed {
                    error: err.to_string(),
                });
            }
        };

        let observed_at = Timestamp::from_utc(now);
        let diff = diff_submissions(&previous, &records, observed_at);
        let mut next = diff.apply_to(&previous);
        let notifications = evaluate_notifications(
            assignment,
            &diff,
            previous.sent_deadline_message,
            now,
            &self.templates,
        );
        if notifications
            .iter()
            .any(|n| n.kind == NotificationKind::Deadline)
        {
            next.sent_deadline_message = Some(observed_at);
        }
        debug!(
            course = %course_period,
            assignment = %assignment.name,
            run = diff.run,
            transitions = diff.transitions.len(),
            "computed diff"
        );

        // Persisted before any delivery; delivery outcomes never change the snapshot.
        let save_error = if self.persist {
            self.store.save(&key, &next).err().map(|err| {
                warn!(
                    course = %course_period,
                    assignment = %assignment.name,
                    run = diff.run,
                    "failed saving snapshot: {err}"
                );
                err.to_string()
            })
        } else {
            None
        };

        let mut deliveries = Vec::with_capacity(notifications.len());
        for notification in &notifications {
            let result = if notification.kind == NotificationKind::Deadline && save_error.is_some() {
                Err(DeliveryError::Rejected(
                    "withheld because the deadline marker could not be saved".to_string(),
                ))
            } else {
                self.deliver(course, notification).await
            };
            if let Err(err) = &result {
                warn!(
                    course = %course_period,
                    assignment = %assignment.name,
                    run = diff.run,
                    "failed sending {:?} message: {err}",
                    notification.kind
                );
            }
            deliveries.push(DeliveryReport {
                kind: notification.kind,
                delivered: result.is_ok(),
                error: result.err().map(|e| e.to_string()),
            });
        }

        info!(
            course = %course_period,
            assignment = %assignment.name,
            run = diff.run,
            total = diff.counts.total,
            finalized = diff.counts.finalized,
            drafts = diff.counts.drafts,
            unclaimed = diff.counts.unclaimed,
            sent = deliveries.iter().filter(|d| d.delivered).count(),
            "processed"
        );

        report(AssignmentOutcome::Processed {
            run: diff.run,
            baseline: diff.baseline,
            counts: diff.counts,
            notifications: deliveries,
            persisted: self.persist && save_error.is_none(),
            save_error,
        })
    }

    async fn deliver(
        &self,
        course: &CourseConfig,
        notification: &Notification,
    ) -> Result<(), DeliveryError> {
        let channel_id = self.channels.get(&course.channel).ok_or_else(|| {
            DeliveryError::Rejected(format!("no channel id for \"{}\"", course.channel))
        })?;
        self.notifier.deliver(channel_id, &notification.text).await
    }
}

/// Checks the configuration against the live platform and notifier.
/// Returns every problem found; an empty list means the config is usable.
pub async fn check_remote(
    config: &Config,
    fetcher: &dyn SubmissionFetcher,
    notifier: &dyn Notifier,
) -> Vec<String> {
    let mut problems = Vec::new();

    for course in &config.sources {
        let course_period = course.course_period();
        match fetcher.list_assignments(&course.course, &course.period).await {
            Ok(known) => {
                let known: BTreeSet<&str> = known.iter().map(String::as_str).collect();
                for assignment in &course.assignments {
                    if !known.contains(assignment.name.as_str()) {
                        problems.push(format!(
                            "course \"{course_period}\" does not have an assignment called \"{}\"",
                            assignment.name
                        ));
                    }
                }
            }
            Err(err) => problems.push(format!("course \"{course_period}\": {err}")),
        }
    }

    let used: BTreeSet<&str> = config.sources.iter().map(|c| c.channel.as_str()).collect();
    for name in used {
        let Some(channel_id) = config.channels.get(name) else {
            continue;
        };
        if let Err(err) = notifier.check_channel(channel_id).await {
            problems.push(format!("channel \"{name}\" ({channel_id}): {err}"));
        }
    }

    problems
}
