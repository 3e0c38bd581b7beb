use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::notify::OutboxDispatcher;
use anyhow::Context;
use lettre::message::Mailbox;
use serde_json::json;
use std::path::{Path, PathBuf};

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "today": state.clock.today().format("%Y-%m-%d").to_string(),
        }),
    )
}

/// Opens (or creates) the store under `path` and points the outbox at it
/// unless one was configured explicitly.
pub fn open_workspace(state: &mut AppState, path: &Path) -> anyhow::Result<()> {
    let from: Mailbox = state
        .config
        .mail_from
        .parse()
        .with_context(|| format!("invalid sender address {:?}", state.config.mail_from))?;
    let conn = db::open_db(path, state.config.busy_timeout)?;
    let outbox = state
        .config
        .outbox_dir
        .clone()
        .unwrap_or_else(|| path.join("outbox"));
    tracing::info!(
        workspace = %path.to_string_lossy(),
        outbox = %outbox.to_string_lossy(),
        "workspace opened"
    );
    state.dispatcher = Some(Box::new(OutboxDispatcher::new(outbox, from)));
    state.workspace = Some(path.to_path_buf());
    state.db = Some(conn);
    Ok(())
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match open_workspace(state, &path) {
        Ok(()) => ok(&req.id, json!({ "workspacePath": path.to_string_lossy() })),
        Err(e) => {
            tracing::error!(error = ?e, "failed to open workspace");
            err(&req.id, "db_open_failed", format!("{e:?}"), None)
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
