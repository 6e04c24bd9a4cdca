//! Read models served by the listing endpoints.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::application::pagination::KeysetRow;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostSummary {
    pub id: i64,
    pub user_id: i64,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub likes_count: i64,
    pub comments_count: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: i64,
    pub title: String,
    pub company: String,
    pub location: String,
    pub job_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary_range: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl KeysetRow for PostSummary {
    fn keyset_id(&self) -> i64 {
        self.id
    }

    fn keyset_time(&self) -> OffsetDateTime {
        self.created_at
    }
}

impl KeysetRow for JobSummary {
    fn keyset_id(&self) -> i64 {
        self.id
    }

    fn keyset_time(&self) -> OffsetDateTime {
        self.created_at
    }
}
