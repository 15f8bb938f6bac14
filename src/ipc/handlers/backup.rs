use crate::backup;
use crate::db;
use crate::ipc::helpers::{log_activity, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::{error, info};

fn workspace_param(state: &AppState, req: &Request) -> Result<PathBuf, HandlerErr> {
    req.params
        .get("workspacePath")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
        .or_else(|| state.workspace.clone())
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

fn handle_backup_export_workspace(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let out_path = required_str(req, "outPath")?;
    let workspace_path = workspace_param(state, req)?;

    let export = backup::export_workspace_bundle(&workspace_path, &PathBuf::from(&out_path))
        .map_err(|e| {
            error!(path = %out_path, error = %e, "workspace export failed");
            HandlerErr::new("io_failed", e.to_string()).with_details(json!({ "path": out_path }))
        })?;
    info!(path = %out_path, sha256 = %export.db_sha256, "workspace exported");
    if let Some(conn) = state.db.as_ref() {
        log_activity(
            conn,
            "export",
            "workspace",
            None,
            Some(json!({ "path": out_path, "dbSha256": export.db_sha256 })),
        );
    }

    Ok(json!({
        "path": out_path,
        "bundleFormat": export.bundle_format,
        "entryCount": export.entry_count,
        "dbSha256": export.db_sha256,
    }))
}

fn handle_backup_import_workspace(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let in_path = required_str(req, "inPath")?;
    let workspace_path = workspace_param(state, req)?;

    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return Err(HandlerErr::new("not_found", "bundle file not found")
            .with_details(json!({ "path": in_path })));
    }

    // The open handle must go before the file is replaced.
    state.db = None;
    let previous = state.workspace.take();

    let import = match backup::import_workspace_bundle(&src, &workspace_path) {
        Ok(v) => v,
        Err(e) => {
            error!(path = %in_path, error = %e, "workspace import failed");
            if let Some(prev) = previous {
                if let Ok(conn) = db::open_db(&prev) {
                    state.workspace = Some(prev);
                    state.db = Some(conn);
                }
            }
            return Err(HandlerErr::new("io_failed", e.to_string())
                .with_details(json!({ "path": in_path })));
        }
    };

    let conn = db::open_db(&workspace_path)
        .map_err(|e| HandlerErr::new("db_open_failed", e.to_string()))?;
    info!(workspace = %workspace_path.display(), sha256 = %import.db_sha256, "workspace imported");
    log_activity(
        &conn,
        "import",
        "workspace",
        None,
        Some(json!({ "path": in_path, "dbSha256": import.db_sha256 })),
    );
    state.workspace = Some(workspace_path.clone());
    state.db = Some(conn);

    Ok(json!({
        "workspacePath": workspace_path.to_string_lossy(),
        "bundleFormatDetected": import.bundle_format_detected,
        "dbSha256": import.db_sha256,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "backup.exportWorkspace" => handle_backup_export_workspace(state, req),
        "backup.importWorkspace" => handle_backup_import_workspace(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
