//! Target-program resolution: locating an executable on `PATH` and building
//! the environment a launched debuggee subprocess should see.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[cfg(windows)]
const EXECUTABLE_EXTENSIONS: &[&str] = &["exe", "bat", "cmd"];

/// Searches `PATH` for `name`, trying platform-appropriate extensions on
/// Windows and an exact match elsewhere. Returns the first candidate that
/// exists, preferring earlier `PATH` entries.
#[must_use]
pub fn resolve_executable(name: &str) -> Option<PathBuf> {
    if let Some(dir) = Path::new(name).parent().filter(|p| !p.as_os_str().is_empty()) {
        let _ = dir;
        let candidate = PathBuf::from(name);
        if candidate.is_file() {
            return Some(candidate);
        }
        return None;
    }

    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        #[cfg(windows)]
        {
            for ext in EXECUTABLE_EXTENSIONS {
                let candidate = dir.join(format!("{name}.{ext}"));
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
            let bare = dir.join(name);
            if bare.is_file() {
                return Some(bare);
            }
        }
        #[cfg(not(windows))]
        {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

/// Builds the environment for a launched subprocess: the current process's
/// environment, overridden by `overrides`. `launch`'s `env` argument is
/// additive, not a replacement — DAP clients expect their own shell's
/// environment (PATH, locale, etc.) to still be visible to the debuggee.
#[must_use]
pub fn build_environment(overrides: &HashMap<String, String>) -> HashMap<String, String> {
    let mut env: HashMap<String, String> = std::env::vars().collect();
    for (key, value) in overrides {
        env.insert(key.clone(), value.clone());
    }
    env
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_executable_finds_something_on_path() {
        // Every supported platform has at least one of these on PATH in CI.
        let candidates = if cfg!(windows) { ["cmd", "where"] } else { ["sh", "ls"] };
        assert!(candidates.iter().any(|c| resolve_executable(c).is_some()));
    }

    #[test]
    fn resolve_executable_returns_none_for_nonsense_name() {
        assert!(resolve_executable("definitely-not-a-real-executable-xyz").is_none());
    }

    #[test]
    fn build_environment_includes_process_env_and_overrides() {
        std::env::set_var("DAPPER_TEST_BASE_VAR", "base");
        let mut overrides = HashMap::new();
        overrides.insert("DAPPER_TEST_OVERRIDE_VAR".to_string(), "override".to_string());

        let env = build_environment(&overrides);
        assert_eq!(env.get("DAPPER_TEST_BASE_VAR"), Some(&"base".to_string()));
        assert_eq!(env.get("DAPPER_TEST_OVERRIDE_VAR"), Some(&"override".to_string()));
    }

    #[test]
    fn build_environment_override_wins_over_process_env() {
        std::env::set_var("DAPPER_TEST_SHARED_VAR", "process");
        let mut overrides = HashMap::new();
        overrides.insert("DAPPER_TEST_SHARED_VAR".to_string(), "overridden".to_string());

        let env = build_environment(&overrides);
        assert_eq!(env.get("DAPPER_TEST_SHARED_VAR"), Some(&"overridden".to_string()));
    }
}
