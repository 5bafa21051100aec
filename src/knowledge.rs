//! Feature-level helpers over the agent knowledge tree.
//!
//! Each helper is a single persisting `update_nested` call, so subscribers
//! see exactly one notification per helper call.

use crate::state::keys::{Applications, Interview, JobSearch, Resume};
use crate::store::StateStore;
use crate::types::{
    ApplicationRecord, InterviewMessage, InterviewRecord, JobRecord, MessageSender,
    ResumeRecord, Timestamp,
};
use chrono::Utc;
use std::collections::BTreeMap;

impl StateStore {
    // --- Job search ---

    /// Save a job, replacing any saved job with the same id.
    ///
    /// Returns true if the job was not saved before.
    pub fn save_job(&self, job: JobRecord) -> bool {
        self.update_nested::<JobSearch, _, _>(|search| search.upsert_job(job), true)
    }

    /// Remove a saved job. Returns false if no job had that id.
    pub fn unsave_job(&self, job_id: &str) -> bool {
        if !self.saved_jobs().iter().any(|job| job.id == job_id) {
            return false;
        }

        self.update_nested::<JobSearch, _, _>(
            |search| {
                let before = search.saved_jobs.len();
                search.saved_jobs.retain(|job| job.id != job_id);
                search.saved_jobs.len() != before
            },
            true,
        )
    }

    pub fn saved_jobs(&self) -> Vec<JobRecord> {
        self.get_knowledge::<JobSearch>().saved_jobs
    }

    /// Record a search query in the history and the recent-searches list.
    ///
    /// Blank queries are ignored.
    pub fn add_search_query(&self, query: &str, results_count: u32) {
        let query = query.trim();
        if query.is_empty() {
            return;
        }

        let limit = self.config().recent_search_limit;
        self.update_nested::<JobSearch, _, _>(
            |search| search.record_search(query, results_count, limit),
            true,
        );
    }

    /// Most recent distinct queries, newest first.
    pub fn recent_searches(&self) -> Vec<String> {
        self.get_knowledge::<JobSearch>().recent_searches
    }

    // --- Applications ---

    /// Insert or replace an application, returning its id.
    ///
    /// An application without an id gets `app-<millis>`, or
    /// `app-<millis>-<n>` when that id is already taken.
    pub fn save_application(&self, mut application: ApplicationRecord) -> String {
        self.update_nested::<Applications, _, _>(
            |applications| {
                if application.id.is_empty() {
                    application.id = unused_application_id(applications, Timestamp::now());
                }
                let id = application.id.clone();
                applications.insert(id.clone(), application);
                id
            },
            true,
        )
    }

    pub fn application(&self, application_id: &str) -> Option<ApplicationRecord> {
        self.get_knowledge::<Applications>().remove(application_id)
    }

    pub fn applications(&self) -> Vec<ApplicationRecord> {
        self.get_knowledge::<Applications>().into_values().collect()
    }

    /// Delete an application. Returns false if it did not exist.
    pub fn delete_application(&self, application_id: &str) -> bool {
        if self.application(application_id).is_none() {
            return false;
        }

        self.update_nested::<Applications, _, _>(
            |applications| applications.remove(application_id).is_some(),
            true,
        )
    }

    // --- Interviews ---

    /// Start (or restart) a mock interview and make it the current session.
    pub fn start_interview(
        &self,
        session_id: impl Into<String>,
        job_role: impl Into<String>,
        experience_level: impl Into<String>,
    ) {
        let session_id = session_id.into();
        let record = InterviewRecord {
            job_role: job_role.into(),
            experience_level: experience_level.into(),
            ..Default::default()
        };

        self.update_nested::<Interview, _, _>(
            |interview| {
                interview.history.insert(session_id.clone(), record);
                interview.current_session_id = Some(session_id);
            },
            true,
        );
    }

    /// Append a message to an interview transcript.
    ///
    /// Returns false if the session is unknown.
    pub fn record_interview_message(
        &self,
        session_id: &str,
        text: impl Into<String>,
        sender: MessageSender,
    ) -> bool {
        if !self.get_knowledge::<Interview>().history.contains_key(session_id) {
            return false;
        }

        let message = InterviewMessage {
            text: text.into(),
            sender,
        };
        self.update_nested::<Interview, _, _>(
            |interview| match interview.history.get_mut(session_id) {
                Some(record) => {
                    record.messages.push(message);
                    true
                }
                None => false,
            },
            true,
        )
    }

    /// Close an interview with optional feedback and score.
    ///
    /// Stamps `endedAt` and clears the current session if it was this one.
    /// Returns false if the session is unknown.
    pub fn end_interview(
        &self,
        session_id: &str,
        feedback: Option<String>,
        score: Option<f64>,
    ) -> bool {
        if !self.get_knowledge::<Interview>().history.contains_key(session_id) {
            return false;
        }

        self.update_nested::<Interview, _, _>(
            |interview| {
                let Some(record) = interview.history.get_mut(session_id) else {
                    return false;
                };
                record.feedback = feedback.or(record.feedback.take());
                record.score = score.or(record.score);
                record.ended_at = Some(Utc::now());

                if interview.current_session_id.as_deref() == Some(session_id) {
                    interview.current_session_id = None;
                }
                true
            },
            true,
        )
    }

    // --- Resumes ---

    /// Store a parsed resume and make it the current one.
    pub fn save_resume(&self, resume_id: impl Into<String>, record: ResumeRecord) {
        let resume_id = resume_id.into();
        self.update_nested::<Resume, _, _>(
            |resume| {
                resume.resumes.insert(resume_id.clone(), record);
                resume.current_resume_id = Some(resume_id);
            },
            true,
        );
    }

    /// The current resume, if one is selected and present.
    pub fn current_resume(&self) -> Option<ResumeRecord> {
        let mut resume = self.get_knowledge::<Resume>();
        let id = resume.current_resume_id.take()?;
        resume.resumes.remove(&id)
    }
}

fn unused_application_id(
    applications: &BTreeMap<String, ApplicationRecord>,
    now: Timestamp,
) -> String {
    let base = format!("app-{}", now.0);
    let mut id = base.clone();
    let mut n = 0;
    while applications.contains_key(&id) {
        n += 1;
        id = format!("{base}-{n}");
    }
    id
}
