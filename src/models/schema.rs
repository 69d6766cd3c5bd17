use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct SchemaColumn {
    pub column_name: String,
    pub data_type: String,
    pub column_default: Option<String>,
    pub is_primary_key: bool,
}

#[derive(Debug, Serialize)]
pub struct SchemaNode {
    pub id: String,
    pub label: String,
    pub columns: Vec<SchemaColumn>,
    pub primary_keys: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SchemaEdge {
    pub id: String,
    pub source: String,
    pub source_column: String,
    pub target: String,
    pub target_column: String,
}

#[derive(Debug, Serialize)]
pub struct SchemaVisualizationResponse {
    pub nodes: Vec<SchemaNode>,
    pub edges: Vec<SchemaEdge>,
}
