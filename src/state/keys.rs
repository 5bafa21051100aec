//! Typed keys addressing sections of the state document.
//!
//! A top-level key implements [`Section`]; a key one level deeper implements
//! [`NestedSection`] with its parent section. The key types are never
//! instantiated, they only select the field at compile time.

use crate::types::{
    AgentKnowledge as KnowledgeValue, ApplicationRecord, InterviewState, JobSearchState,
    ResumeState, StateDocument, SystemState, Timestamp, UserProfile, UserState, ValueMap,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;

/// A top-level field of [`StateDocument`].
pub trait Section: 'static {
    type Value: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Field name as it appears in the serialized document.
    const NAME: &'static str;

    /// Whether mutations of this section are written to storage.
    const PERSISTENT: bool = true;

    fn get(doc: &StateDocument) -> &Self::Value;
    fn get_mut(doc: &mut StateDocument) -> &mut Self::Value;
}

/// A field one level below a [`Section`].
pub trait NestedSection: 'static {
    type Parent: Section;
    type Value: Clone + Serialize + DeserializeOwned + Send + Sync + 'static;

    const NAME: &'static str;

    fn get(parent: &<Self::Parent as Section>::Value) -> &Self::Value;
    fn get_mut(parent: &mut <Self::Parent as Section>::Value) -> &mut Self::Value;
}

macro_rules! section {
    ($key:ident, $value:ty, $name:literal, $field:ident) => {
        pub enum $key {}

        impl Section for $key {
            type Value = $value;
            const NAME: &'static str = $name;

            fn get(doc: &StateDocument) -> &Self::Value {
                &doc.$field
            }

            fn get_mut(doc: &mut StateDocument) -> &mut Self::Value {
                &mut doc.$field
            }
        }
    };
}

macro_rules! nested {
    ($key:ident, $parent:ty, $value:ty, $name:literal, $field:ident) => {
        pub enum $key {}

        impl NestedSection for $key {
            type Parent = $parent;
            type Value = $value;
            const NAME: &'static str = $name;

            fn get(parent: &<$parent as Section>::Value) -> &Self::Value {
                &parent.$field
            }

            fn get_mut(parent: &mut <$parent as Section>::Value) -> &mut Self::Value {
                &mut parent.$field
            }
        }
    };
}

section!(User, UserState, "user", user);
section!(Knowledge, KnowledgeValue, "agentKnowledge", agent_knowledge);
section!(System, SystemState, "system", system);

/// Ephemeral, process-lifetime values. Never persisted.
pub enum Session {}

impl Section for Session {
    type Value = ValueMap;
    const NAME: &'static str = "session";
    const PERSISTENT: bool = false;

    fn get(doc: &StateDocument) -> &Self::Value {
        &doc.session
    }

    fn get_mut(doc: &mut StateDocument) -> &mut Self::Value {
        &mut doc.session
    }
}

nested!(UserId, User, String, "id", id);
nested!(Preferences, User, ValueMap, "preferences", preferences);

nested!(Profile, Knowledge, UserProfile, "userProfile", user_profile);
nested!(Interview, Knowledge, InterviewState, "interview", interview);
nested!(Resume, Knowledge, ResumeState, "resume", resume);
nested!(JobSearch, Knowledge, JobSearchState, "jobSearch", job_search);
nested!(
    Applications,
    Knowledge,
    BTreeMap<String, ApplicationRecord>,
    "applications",
    applications
);

nested!(Online, System, bool, "isOnline", is_online);
nested!(LastSync, System, Option<Timestamp>, "lastSyncTime", last_sync_time);
nested!(
    ApiEndpoints,
    System,
    BTreeMap<String, String>,
    "apiEndpoints",
    api_endpoints
);
