use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Bucket {
    pub id: Uuid,
    pub name: String,
    pub public: bool,
    pub description: Option<String>,
    pub owner_id: Uuid,
    pub metadata: serde_json::Value,
    pub file_count: i64,
    pub total_size: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BucketCreate {
    pub name: String,
    #[serde(default)]
    pub public: bool,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BucketUpdate {
    pub public: Option<bool>,
    pub description: Option<String>,
}
