pub mod backups;
pub mod functions;
pub mod health;
pub mod realtime;
pub mod schema;
pub mod sql;
pub mod storage;
pub mod system;
pub mod tables;
pub mod users;
pub mod webhooks;
