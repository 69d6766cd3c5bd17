use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub initialized: bool,
    pub version: String,
}
