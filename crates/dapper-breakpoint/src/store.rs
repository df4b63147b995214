//! Bookkeeping stores for source, function, and exception breakpoints.

use crate::BreakpointError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A breakpoint as requested by the client, before an id has been assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakpointSpec {
    pub line: i64,
    pub column: Option<i64>,
    pub condition: Option<String>,
    pub hit_condition: Option<String>,
    pub log_message: Option<String>,
}

impl BreakpointSpec {
    /// Two specs are considered the "same breakpoint" across a replace when
    /// their line and all three optional expressions match.
    fn identity_matches(&self, other: &BreakpointSpec) -> bool {
        self.line == other.line
            && self.condition == other.condition
            && self.hit_condition == other.hit_condition
            && self.log_message == other.log_message
    }
}

/// A breakpoint with an assigned, stable id and verification state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakpointRecord {
    pub id: i64,
    pub spec: BreakpointSpec,
    pub verified: bool,
    /// Line actually armed by the backend, if it differs from `spec.line`.
    pub adjusted_line: Option<i64>,
    pub message: Option<String>,
}

impl BreakpointRecord {
    #[must_use]
    pub fn effective_line(&self) -> i64 {
        self.adjusted_line.unwrap_or(self.spec.line)
    }

    #[must_use]
    pub fn is_logpoint(&self) -> bool {
        self.spec.log_message.is_some()
    }
}

/// Normalizes a client-supplied `source.path` before it's used as a store
/// key: backslashes become forward slashes and a trailing slash is
/// stripped, so `C:\proj\a.py`, `C:/proj/a.py/`, and `C:/proj/a.py` all key
/// to the same breakpoint set. Case is folded only on Windows, where the
/// filesystem itself is case-insensitive — folding it on Unix would
/// conflate genuinely distinct files.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let trimmed = unified.trim_end_matches('/');
    if cfg!(windows) {
        trimmed.to_lowercase()
    } else {
        trimmed.to_string()
    }
}

/// Source breakpoints for one loaded session, keyed by [`normalize_path`]
/// of the client-supplied source path.
///
/// `setBreakpoints` has REPLACE semantics: each call supplies the *entire*
/// desired set of breakpoints for a source. Ids are preserved across a
/// replace for any spec whose `(line, condition, hit_condition,
/// log_message)` tuple is unchanged, so clients that re-set breakpoints after
/// an edit don't see spurious id churn in `breakpoint changed` events.
#[derive(Debug, Default)]
pub struct BreakpointStore {
    by_source: HashMap<String, Vec<BreakpointRecord>>,
    next_id: i64,
}

impl BreakpointStore {
    #[must_use]
    pub fn new() -> Self {
        Self { by_source: HashMap::new(), next_id: 1 }
    }

    /// Replaces all breakpoints for `path` (normalized via [`normalize_path`])
    /// with `specs`, returning the new records in the same order as `specs`.
    /// Unverified by default; call [`Self::apply_verification`] once the
    /// backend reports back.
    pub fn set_breakpoints(
        &mut self,
        path: &str,
        specs: Vec<BreakpointSpec>,
    ) -> Result<Vec<BreakpointRecord>, BreakpointError> {
        if path.is_empty() {
            return Err(BreakpointError::EmptyPath);
        }
        let normalized_path = normalize_path(path);

        let previous = self.by_source.remove(&normalized_path).unwrap_or_default();
        let mut remaining = previous;

        let records: Vec<BreakpointRecord> = specs
            .into_iter()
            .map(|spec| {
                let reused = remaining
                    .iter()
                    .position(|r| r.spec.identity_matches(&spec))
                    .map(|idx| remaining.remove(idx));

                match reused {
                    Some(old) => BreakpointRecord {
                        id: old.id,
                        spec,
                        verified: old.verified,
                        adjusted_line: old.adjusted_line,
                        message: old.message,
                    },
                    None => {
                        let id = self.next_id;
                        self.next_id += 1;
                        BreakpointRecord { id, spec, verified: false, adjusted_line: None, message: None }
                    }
                }
            })
            .collect();

        self.by_source.insert(normalized_path, records.clone());
        Ok(records)
    }

    /// Marks a breakpoint verified/adjusted once the backend has armed it.
    pub fn apply_verification(
        &mut self,
        path: &str,
        id: i64,
        verified: bool,
        adjusted_line: Option<i64>,
        message: Option<String>,
    ) -> Result<(), BreakpointError> {
        let records = self.by_source.get_mut(&normalize_path(path)).ok_or(BreakpointError::UnknownId(id))?;
        let record = records.iter_mut().find(|r| r.id == id).ok_or(BreakpointError::UnknownId(id))?;
        record.verified = verified;
        record.adjusted_line = adjusted_line;
        record.message = message;
        Ok(())
    }

    #[must_use]
    pub fn for_source(&self, path: &str) -> &[BreakpointRecord] {
        self.by_source.get(&normalize_path(path)).map_or(&[], Vec::as_slice)
    }

    pub fn all(&self) -> impl Iterator<Item = (&str, &BreakpointRecord)> {
        self.by_source.iter().flat_map(|(path, records)| records.iter().map(move |r| (path.as_str(), r)))
    }
}

/// A function breakpoint, by name rather than by file position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionBreakpointSpec {
    pub name: String,
    pub condition: Option<String>,
    pub hit_condition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionBreakpointRecord {
    pub id: i64,
    pub spec: FunctionBreakpointSpec,
    pub verified: bool,
    pub message: Option<String>,
}

/// Bookkeeping store for `setFunctionBreakpoints`, mirroring
/// [`BreakpointStore`]'s replace-with-id-reuse semantics.
#[derive(Debug, Default)]
pub struct FunctionBreakpointStore {
    records: Vec<FunctionBreakpointRecord>,
    next_id: i64,
}

impl FunctionBreakpointStore {
    #[must_use]
    pub fn new() -> Self {
        Self { records: Vec::new(), next_id: 1 }
    }

    pub fn set_breakpoints(
        &mut self,
        specs: Vec<FunctionBreakpointSpec>,
    ) -> Vec<FunctionBreakpointRecord> {
        let mut remaining = std::mem::take(&mut self.records);

        self.records = specs
            .into_iter()
            .map(|spec| {
                let reused = remaining
                    .iter()
                    .position(|r| {
                        r.spec.name == spec.name
                            && r.spec.condition == spec.condition
                            && r.spec.hit_condition == spec.hit_condition
                    })
                    .map(|idx| remaining.remove(idx));

                match reused {
                    Some(old) => FunctionBreakpointRecord {
                        id: old.id,
                        spec,
                        verified: old.verified,
                        message: old.message,
                    },
                    None => {
                        let id = self.next_id;
                        self.next_id += 1;
                        FunctionBreakpointRecord { id, spec, verified: false, message: None }
                    }
                }
            })
            .collect();

        self.records.clone()
    }

    #[must_use]
    pub fn records(&self) -> &[FunctionBreakpointRecord] {
        &self.records
    }
}

/// Tracks which exception breakpoint filters are currently active.
///
/// Filter order is preserved exactly as supplied by the client: some clients
/// render filter state positionally, and DAP does not say filters are a set.
#[derive(Debug, Default, Clone)]
pub struct ExceptionFilterState {
    active: Vec<String>,
}

impl ExceptionFilterState {
    #[must_use]
    pub fn new() -> Self {
        Self { active: Vec::new() }
    }

    pub fn set_filters(&mut self, filters: Vec<String>) {
        self.active = filters;
    }

    #[must_use]
    pub fn active(&self) -> &[String] {
        &self.active
    }

    #[must_use]
    pub fn is_active(&self, filter: &str) -> bool {
        self.active.iter().any(|f| f == filter)
    }
}
