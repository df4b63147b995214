//! `dapper/hotReload` orchestration (§4.11).
//!
//! The seven steps split across two owners: steps 1-4 and 6 (resolve module
//! identity, invalidate compiled/frame-eval caches, reload and re-execute the
//! module body, optionally rebind stopped-stack references) happen inside the
//! backend, which actually holds the debuggee's compiled state — this crate
//! has no visibility into that. Steps 5 and 7 (re-arm breakpoints for the
//! file, emit the result) are bookkeeping this crate already owns, so they
//! run here around the backend call rather than being re-implemented on every
//! backend.

use crate::backend::Backend;
use crate::error::DapperError;
use crate::protocol::HotReloadResultBody;
use crate::session::SessionState;
use std::time::Instant;

#[derive(Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BreakpointVerification {
    pub id: i64,
    pub verified: bool,
    #[serde(default)]
    pub adjusted_line: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Runs hot reload for `path`: re-executes the module on the backend, then
/// re-arms whatever breakpoints were already set for that file so a reload
/// doesn't silently drop them. Breakpoint ids are preserved (the
/// [`crate::config`]'s underlying [`dapper_breakpoint::BreakpointStore`]
/// reuses ids for unchanged specs), so the client doesn't see spurious
/// `breakpoint` events unless the backend actually moved something.
pub async fn perform(
    session: &mut SessionState,
    backend: &dyn Backend,
    path: &str,
) -> Result<HotReloadResultBody, DapperError> {
    let started = Instant::now();

    let raw = backend
        .hot_reload(serde_json::json!({ "path": path }))
        .await?
        .ok_or_else(|| DapperError::HotReload("backend does not support hot reload".to_string()))?;
    let mut body: HotReloadResultBody =
        serde_json::from_value(raw).map_err(|e| DapperError::HotReload(format!("malformed hot reload result: {e}")))?;

    let specs = session.breakpoints.for_source(path).iter().map(|r| r.spec.clone()).collect();
    let records = match session.breakpoints.set_breakpoints(path, specs) {
        Ok(records) => records,
        Err(e) => {
            body.warnings.push(format!("failed to re-arm breakpoints for {path}: {e}"));
            return Ok(finish(body, started));
        }
    };

    match backend.set_breakpoints(path, serde_json::to_value(&records).unwrap_or(serde_json::Value::Null)).await {
        Ok(result) => {
            let verifications: Vec<BreakpointVerification> = serde_json::from_value(result).unwrap_or_default();
            for v in verifications {
                let _ = session.breakpoints.apply_verification(path, v.id, v.verified, v.adjusted_line, v.message);
            }
        }
        Err(e) => body.warnings.push(format!("breakpoints for {path} were not re-armed after reload: {e}")),
    }

    Ok(finish(body, started))
}

fn finish(mut body: HotReloadResultBody, started: Instant) -> HotReloadResultBody {
    let rearm_ms = started.elapsed().as_millis() as u64;
    body.duration_ms = body.duration_ms.saturating_add(rearm_ms);
    body
}
