// models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "results_visibility", rename_all = "snake_case")]
pub enum ResultsVisibility {
    #[default]
    Always,
    AfterVoting,
    AfterExpiry,
    Never,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PollOption {
    pub id: Uuid,
    pub value: String,
    pub position: i32,
    pub vote_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Poll {
    pub id: Uuid,
    pub question: String,
    pub description: Option<String>,
    /// Ordered by position, then id.
    pub options: Vec<PollOption>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub results_visibility: ResultsVisibility,
    pub is_private: bool,
}

impl Poll {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// Whether vote counts may be shown to a caller.
    pub fn results_visible(&self, has_voted: bool, now: DateTime<Utc>) -> bool {
        match self.results_visibility {
            ResultsVisibility::Always => true,
            ResultsVisibility::AfterVoting => has_voted,
            ResultsVisibility::AfterExpiry => self.is_expired(now),
            ResultsVisibility::Never => false,
        }
    }

    pub fn option(&self, option_id: Uuid) -> Option<&PollOption> {
        self.options.iter().find(|option| option.id == option_id)
    }
}

/// Option as supplied by a caller, before an id is assigned.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewOption {
    pub value: String,
    #[serde(default)]
    pub position: i32,
    #[serde(skip_deserializing)]
    pub vote_count: i64,
}

impl NewOption {
    pub fn new(value: impl Into<String>, position: i32) -> Self {
        Self {
            value: value.into(),
            position,
            vote_count: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewPoll {
    pub question: String,
    pub description: Option<String>,
    pub options: Vec<NewOption>,
    pub expires_at: Option<DateTime<Utc>>,
    pub results_visibility: ResultsVisibility,
    pub is_private: bool,
}

/// Target position for one option in a batch reposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct OptionPosition {
    pub id: Uuid,
    pub position: i32,
}

/// Parses a caller-supplied identifier. Empty or malformed ids are `NotFound`.
pub fn parse_id(raw: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| StoreError::NotFound)
}

pub fn sort_options(options: &mut [PollOption]) {
    options.sort_by(|a, b| a.position.cmp(&b.position).then(a.id.cmp(&b.id)));
}
