use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::models::backup::{BackupInfo, BackupResult, RestoreResult};
use crate::state::AppState;

const BACKUP_FILENAME_PREFIX: &str = "selfdb_backup_";

fn backup_dir(state: &AppState) -> PathBuf {
    PathBuf::from(&state.config.backup_dir)
}

fn pg_env(state: &AppState) -> Vec<(&'static str, String)> {
    vec![("PGPASSWORD", state.config.postgres_password.clone())]
}

/// Dumps the database with `pg_dump`, tars it up alongside the storage
/// volume into a single `.tar.gz`, and drops it in the backup directory.
/// Mirrors the source's `create_backup`, minus the `.env` snapshot (this
/// gateway's configuration lives in the process environment, not a file
/// this container can read back out).
pub async fn create_backup(state: &Arc<AppState>) -> BackupResult {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
    let filename = format!("{BACKUP_FILENAME_PREFIX}{timestamp}.tar.gz");
    let dir = backup_dir(state);
    let temp_dir = std::env::temp_dir().join(format!("backup_{timestamp}"));

    if let Err(e) = tokio::fs::create_dir_all(&dir).await {
        return BackupResult { success: false, filename: None, message: format!("failed to create backup dir: {e}") };
    }
    if let Err(e) = tokio::fs::create_dir_all(&temp_dir).await {
        return BackupResult { success: false, filename: None, message: format!("failed to create temp dir: {e}") };
    }

    let sql_file = temp_dir.join("database.sql");
    let output = tokio::process::Command::new("pg_dump")
        .args([
            "-h",
            &state.config.postgres_host,
            "-p",
            &state.config.postgres_port.to_string(),
            "-U",
            &state.config.postgres_user,
            "-d",
            &state.config.postgres_db,
            "-f",
        ])
        .arg(&sql_file)
        .args(["--clean", "--if-exists", "--no-owner", "--no-privileges"])
        .envs(pg_env(state))
        .output()
        .await;

    let output = match output {
        Ok(o) => o,
        Err(e) => {
            let _ = tokio::fs::remove_dir_all(&temp_dir).await;
            return BackupResult { success: false, filename: None, message: format!("failed to run pg_dump: {e}") };
        }
    };

    if !output.status.success() {
        let _ = tokio::fs::remove_dir_all(&temp_dir).await;
        let stderr = String::from_utf8_lossy(&output.stderr);
        return BackupResult { success: false, filename: None, message: format!("pg_dump failed: {stderr}") };
    }

    let storage_src = PathBuf::from(&state.config.storage_data_path);
    if storage_src.is_dir() {
        let storage_dest = temp_dir.join("storage");
        if let Err(e) = copy_dir_recursive(&storage_src, &storage_dest) {
            tracing::warn!(error = %e, "failed to include storage data in backup");
        }
    }

    let archive_path = dir.join(&filename);
    let result = tar_gz_dir(&temp_dir, &archive_path);
    let _ = tokio::fs::remove_dir_all(&temp_dir).await;

    match result {
        Ok(size) => BackupResult {
            success: true,
            filename: Some(filename),
            message: format!("Backup created successfully ({:.2} MB)", size as f64 / 1024.0 / 1024.0),
        },
        Err(e) => BackupResult { success: false, filename: None, message: format!("failed to build archive: {e}") },
    }
}

fn tar_gz_dir(source: &Path, dest: &Path) -> std::io::Result<u64> {
    let file = std::fs::File::create(dest)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.append_dir_all(".", source)?;
    builder.into_inner()?.finish()?;
    Ok(std::fs::metadata(dest)?.len())
}

fn copy_dir_recursive(src: &Path, dest: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dest)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let dest_path = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &dest_path)?;
        } else {
            std::fs::copy(entry.path(), &dest_path)?;
        }
    }
    Ok(())
}

fn is_safe_filename(filename: &str) -> bool {
    filename.starts_with(BACKUP_FILENAME_PREFIX)
        && filename.ends_with(".tar.gz")
        && !filename.contains('/')
        && !filename.contains('\\')
        && !filename.contains("..")
}

pub async fn list_backups(state: &AppState) -> Vec<BackupInfo> {
    let dir = backup_dir(state);
    let mut entries = match tokio::fs::read_dir(&dir).await {
        Ok(e) => e,
        Err(_) => return Vec::new(),
    };

    let mut backups = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !is_safe_filename(&name) {
            continue;
        }
        let Ok(metadata) = entry.metadata().await else { continue };
        let Ok(created_at) = metadata.modified().map(chrono::DateTime::<Utc>::from) else { continue };
        backups.push(BackupInfo { filename: name, size_bytes: metadata.len(), created_at });
    }

    backups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    backups
}

pub async fn get_backup_path(state: &AppState, filename: &str) -> Option<PathBuf> {
    if !is_safe_filename(filename) {
        return None;
    }
    let path = backup_dir(state).join(filename);
    if tokio::fs::metadata(&path).await.is_ok() {
        Some(path)
    } else {
        None
    }
}

pub async fn delete_backup(state: &AppState, filename: &str) -> bool {
    match get_backup_path(state, filename).await {
        Some(path) => tokio::fs::remove_file(path).await.is_ok(),
        None => false,
    }
}

async fn cleanup_old_backups(state: &AppState) {
    let cutoff = Utc::now() - chrono::Duration::days(state.config.backup_retention_days);
    for backup in list_backups(state).await {
        if backup.created_at < cutoff {
            if delete_backup(state, &backup.filename).await {
                tracing::info!(filename = %backup.filename, "deleted expired backup");
            }
        }
    }
}

/// Drops and recreates the `public` schema, restores from the archive's
/// `database.sql`, and replaces the storage volume's contents. Only called
/// when `system_config.initialized = false`, enforced by the caller.
pub async fn restore_from_backup(state: &Arc<AppState>, backup_data: &[u8]) -> RestoreResult {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S%f").to_string();
    let temp_dir = std::env::temp_dir().join(format!("restore_{timestamp}"));

    if let Err(e) = tokio::fs::create_dir_all(&temp_dir).await {
        return RestoreResult { success: false, message: format!("failed to create temp dir: {e}") };
    }

    if let Err(e) = extract_tar_gz(backup_data, &temp_dir) {
        let _ = tokio::fs::remove_dir_all(&temp_dir).await;
        return RestoreResult { success: false, message: format!("failed to extract backup archive: {e}") };
    }

    let sql_file = temp_dir.join("database.sql");
    if tokio::fs::metadata(&sql_file).await.is_err() {
        let _ = tokio::fs::remove_dir_all(&temp_dir).await;
        return RestoreResult { success: false, message: "invalid backup archive: missing database.sql".into() };
    }

    let terminate = tokio::process::Command::new("psql")
        .args([
            "-h",
            &state.config.postgres_host,
            "-p",
            &state.config.postgres_port.to_string(),
            "-U",
            &state.config.postgres_user,
            "-d",
            "postgres",
            "-c",
            &format!(
                "SELECT pg_terminate_backend(pid) FROM pg_stat_activity WHERE datname = '{}' AND pid <> pg_backend_pid();",
                state.config.postgres_db
            ),
        ])
        .envs(pg_env(state))
        .output();
    let _ = tokio::time::timeout(StdDuration::from_secs(10), terminate).await;

    let drop_schema = tokio::process::Command::new("psql")
        .args([
            "-h",
            &state.config.postgres_host,
            "-p",
            &state.config.postgres_port.to_string(),
            "-U",
            &state.config.postgres_user,
            "-d",
            &state.config.postgres_db,
            "-c",
            "DROP SCHEMA public CASCADE; CREATE SCHEMA public;",
        ])
        .envs(pg_env(state))
        .output();
    match tokio::time::timeout(StdDuration::from_secs(30), drop_schema).await {
        Ok(Ok(output)) if !output.status.success() => {
            let _ = tokio::fs::remove_dir_all(&temp_dir).await;
            return RestoreResult {
                success: false,
                message: format!("failed to reset schema: {}", String::from_utf8_lossy(&output.stderr)),
            };
        }
        Err(_) => {
            let _ = tokio::fs::remove_dir_all(&temp_dir).await;
            return RestoreResult {
                success: false,
                message: "database drop schema timed out; there may be active connections blocking the operation".into(),
            };
        }
        Ok(Err(e)) => {
            let _ = tokio::fs::remove_dir_all(&temp_dir).await;
            return RestoreResult { success: false, message: format!("failed to run psql: {e}") };
        }
        _ => {}
    }

    let restore = tokio::process::Command::new("psql")
        .args([
            "-h",
            &state.config.postgres_host,
            "-p",
            &state.config.postgres_port.to_string(),
            "-U",
            &state.config.postgres_user,
            "-d",
            &state.config.postgres_db,
            "-f",
        ])
        .arg(&sql_file)
        .envs(pg_env(state))
        .output();

    let restore_output = match tokio::time::timeout(StdDuration::from_secs(120), restore).await {
        Ok(Ok(o)) => o,
        Ok(Err(e)) => {
            let _ = tokio::fs::remove_dir_all(&temp_dir).await;
            return RestoreResult { success: false, message: format!("failed to run psql: {e}") };
        }
        Err(_) => {
            let _ = tokio::fs::remove_dir_all(&temp_dir).await;
            return RestoreResult {
                success: false,
                message: "database restore timed out; the backup file may be too large".into(),
            };
        }
    };

    if !restore_output.status.success() {
        let _ = tokio::fs::remove_dir_all(&temp_dir).await;
        return RestoreResult {
            success: false,
            message: format!("database restore failed: {}", String::from_utf8_lossy(&restore_output.stderr)),
        };
    }

    let storage_backup_dir = temp_dir.join("storage");
    if storage_backup_dir.is_dir() {
        let storage_dest = PathBuf::from(&state.config.storage_data_path);
        if storage_dest.is_dir() {
            let _ = tokio::fs::remove_dir_all(&storage_dest).await;
        }
        if let Err(e) = copy_dir_recursive(&storage_backup_dir, &storage_dest) {
            tracing::warn!(error = %e, "failed to restore storage data, continuing");
        }
    }

    let _ = tokio::fs::remove_dir_all(&temp_dir).await;

    RestoreResult {
        success: true,
        message: "Backup restored successfully (database + storage). Please log in with your restored credentials.".into(),
    }
}

fn extract_tar_gz(data: &[u8], dest: &Path) -> std::io::Result<()> {
    let decoder = flate2::read::GzDecoder::new(data);
    let mut archive = tar::Archive::new(decoder);
    for entry in archive.entries()? {
        let entry = entry?;
        let path = entry.path()?;
        if path.is_absolute() || path.components().any(|c| c == std::path::Component::ParentDir) {
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "unsafe path in backup archive"));
        }
    }

    let decoder = flate2::read::GzDecoder::new(data);
    let mut archive = tar::Archive::new(decoder);
    archive.unpack(dest)
}

fn parse_cron_schedule(cron_str: &str) -> anyhow::Result<cron::Schedule> {
    // `cron`'s own parser expects a leading seconds field; the schedule is
    // configured in the standard 5-field minute/hour/day/month/dow shape.
    let with_seconds = format!("0 {cron_str}");
    Ok(with_seconds.parse()?)
}

/// Runs `create_backup` on the configured cron schedule, then prunes
/// backups older than the retention window. Spawned once at startup and
/// left running for the life of the process.
pub fn spawn_scheduler(state: Arc<AppState>) {
    let schedule = match parse_cron_schedule(&state.config.backup_schedule_cron) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, cron = %state.config.backup_schedule_cron, "invalid BACKUP_SCHEDULE_CRON, scheduler disabled");
            return;
        }
    };

    tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let Some(next) = schedule.after(&now).next() else {
                tracing::error!("backup schedule produced no further fire times, stopping scheduler");
                return;
            };
            let wait = (next - now).to_std().unwrap_or(StdDuration::from_secs(60));
            tokio::time::sleep(wait).await;

            tracing::info!("running scheduled backup");
            let result = create_backup(&state).await;
            if result.success {
                tracing::info!(filename = ?result.filename, "scheduled backup completed");
                cleanup_old_backups(&state).await;
            } else {
                tracing::error!(message = %result.message, "scheduled backup failed");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_filename_accepts_well_formed_names() {
        assert!(is_safe_filename("selfdb_backup_20260730_120000.tar.gz"));
    }

    #[test]
    fn safe_filename_rejects_path_traversal() {
        assert!(!is_safe_filename("selfdb_backup_../../etc/passwd.tar.gz"));
        assert!(!is_safe_filename("../selfdb_backup_x.tar.gz"));
        assert!(!is_safe_filename("selfdb_backup_x/y.tar.gz"));
    }

    #[test]
    fn safe_filename_rejects_wrong_prefix_or_suffix() {
        assert!(!is_safe_filename("not_a_backup_20260730.tar.gz"));
        assert!(!is_safe_filename("selfdb_backup_20260730.zip"));
    }

    #[test]
    fn cron_schedule_accepts_five_field_expression() {
        assert!(parse_cron_schedule("0 3 * * *").is_ok());
    }

    #[test]
    fn cron_schedule_rejects_garbage() {
        assert!(parse_cron_schedule("not a cron expression").is_err());
    }
}
