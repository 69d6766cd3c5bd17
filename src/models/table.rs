use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// One column declaration inside a `table_schema` JSON map, as accepted by
/// `POST /tables/`. `type` is a declared logical type (see `tables_engine::ddl`
/// for the mapping into a physical Postgres type).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSpec {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub nullable: bool,
    pub default: Option<serde_json::Value>,
}

pub type TableSchema = BTreeMap<String, ColumnSpec>;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TableRegistryEntry {
    pub id: Uuid,
    pub name: String,
    pub table_schema: serde_json::Value,
    pub public: bool,
    pub owner_id: Uuid,
    pub description: Option<String>,
    pub metadata: serde_json::Value,
    pub row_count: i64,
    pub realtime_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableCreate {
    pub name: String,
    #[serde(default)]
    pub table_schema: TableSchema,
    #[serde(default)]
    pub public: bool,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableUpdate {
    pub name: Option<String>,
    pub public: Option<bool>,
    pub description: Option<String>,
    pub realtime_enabled: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct TableDataResponse {
    pub data: Vec<serde_json::Value>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnAdd {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub nullable: bool,
    pub default: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnUpdate {
    pub new_name: Option<String>,
    #[serde(rename = "type")]
    pub type_name: Option<String>,
    pub nullable: Option<bool>,
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub drop_default: bool,
}
