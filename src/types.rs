//! Core types for the application state document.
//!
//! Field names on the wire and on disk are camelCase so persisted snapshots
//! and backend payloads stay compatible with the mobile client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Placeholder user id until authentication assigns a real one.
pub const DEFAULT_USER_ID: &str = "default_user";

/// Default number of entries kept in `recentSearches`.
pub const DEFAULT_RECENT_SEARCH_LIMIT: usize = 5;

/// Milliseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(duration.as_millis() as i64)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

// Backends written in other languages sometimes send fractional millis.
impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Float(f64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Int(ms) => Ok(Timestamp(ms)),
            Raw::Float(ms) if ms.is_finite() => Ok(Timestamp(ms as i64)),
            Raw::Float(ms) => Err(serde::de::Error::custom(format!(
                "timestamp is not finite: {ms}"
            ))),
        }
    }
}

/// Free-form values keyed by name (preferences, session bag).
pub type ValueMap = BTreeMap<String, Value>;

/// The single document holding all client-side application state.
///
/// `session` is skipped by serde, so it never reaches the persisted snapshot
/// or an outbound sync payload, and always deserializes empty.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StateDocument {
    pub user: UserState,
    #[serde(skip)]
    pub session: ValueMap,
    pub agent_knowledge: AgentKnowledge,
    pub system: SystemState,
}

/// Identity of the active local user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserState {
    pub id: String,
    pub preferences: ValueMap,
}

impl Default for UserState {
    fn default() -> Self {
        Self {
            id: DEFAULT_USER_ID.to_string(),
            preferences: ValueMap::new(),
        }
    }
}

/// Knowledge shared across the interview, resume, job search and
/// application-tracking features.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentKnowledge {
    pub user_profile: UserProfile,
    pub interview: InterviewState,
    pub resume: ResumeState,
    pub job_search: JobSearchState,
    pub applications: BTreeMap<String, ApplicationRecord>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub skills: Vec<String>,
    pub experience: Vec<String>,
    pub education: Vec<String>,
    pub preferences: JobPreferences,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobPreferences {
    pub job_types: Vec<String>,
    pub locations: Vec<String>,
    pub salary: SalaryRange,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SalaryRange {
    pub min: f64,
    pub max: f64,
    pub currency: String,
}

impl Default for SalaryRange {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 0.0,
            currency: "USD".to_string(),
        }
    }
}

// --- Interview ---

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InterviewState {
    pub current_session_id: Option<String>,
    pub history: BTreeMap<String, InterviewRecord>,
}

/// One mock-interview session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewRecord {
    pub job_role: String,
    pub experience_level: String,
    #[serde(default)]
    pub messages: Vec<InterviewMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InterviewMessage {
    pub text: String,
    pub sender: MessageSender,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSender {
    Agent,
    User,
}

// --- Resume ---

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResumeState {
    pub current_resume_id: Option<String>,
    pub resumes: BTreeMap<String, ResumeRecord>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeRecord {
    #[serde(default)]
    pub parsed_data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

// --- Job search ---

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobSearchState {
    pub saved_jobs: Vec<JobRecord>,
    pub search_history: Vec<SearchHistoryEntry>,
    pub recent_searches: Vec<String>,
}

impl JobSearchState {
    /// Record a search: append to history and move `query` to the front of
    /// `recent_searches`, keeping at most `limit` distinct entries.
    pub fn record_search(&mut self, query: &str, results_count: u32, limit: usize) {
        self.search_history.push(SearchHistoryEntry {
            query: query.to_string(),
            date: Utc::now(),
            results_count,
        });

        self.recent_searches.retain(|q| q != query);
        self.recent_searches.insert(0, query.to_string());
        self.recent_searches.truncate(limit);
    }

    /// Insert `job`, or replace the saved job with the same id.
    ///
    /// Returns true if the job was new.
    pub fn upsert_job(&mut self, mut job: JobRecord) -> bool {
        let now = Utc::now();
        job.updated_at = Some(now);

        match self.saved_jobs.iter_mut().find(|j| j.id == job.id) {
            Some(existing) => {
                job.created_at = existing.created_at.or(job.created_at);
                *existing = job;
                false
            }
            None => {
                job.created_at = Some(job.created_at.unwrap_or(now));
                self.saved_jobs.push(job);
                true
            }
        }
    }
}

/// A job posting the user saved.
///
/// Fields the backend sends beyond the known ones are kept in `details`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub company: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub details: ValueMap,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHistoryEntry {
    pub query: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub results_count: u32,
}

// --- Applications ---

/// A tracked job application.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplicationRecord {
    pub id: String,
    pub job_title: String,
    pub company: String,
    pub location: String,
    pub status: String,
    pub application_deadline: Option<String>,
    pub follow_up_date: Option<String>,
    pub follow_up_time: String,
    pub applied_date: String,
    pub notes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_url: Option<String>,
}

// --- System ---

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SystemState {
    pub is_online: bool,
    pub last_sync_time: Option<Timestamp>,
    pub api_endpoints: BTreeMap<String, String>,
}

impl Default for SystemState {
    fn default() -> Self {
        let base = "http://localhost:8000";
        let api_endpoints = [
            ("base", base.to_string()),
            ("mockMate", format!("{base}/agents/mock_mate")),
            ("trackPal", format!("{base}/agents/track_pal")),
            ("pathFinder", format!("{base}/agents/path_finder")),
            ("resumeRefiner", format!("{base}/agents/resume_refiner")),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            is_online: true,
            last_sync_time: None,
            api_endpoints,
        }
    }
}
