//! Workspace and config-layer path resolution, with XDG-style legacy-path
//! migration for the optional user-level shared config: the directory
//! name settled on `contest_env/` after an earlier `.cph-env/` layout,
//! so both are checked.

use std::path::{Path, PathBuf};

/// Canonical per-layer config directory name.
pub const CONFIG_DIR_NAME: &str = "contest_env";
/// Directory name used by an earlier prototype of this layout; still read
/// as a fallback so existing workspaces keep working after upgrade.
pub const LEGACY_CONFIG_DIR_NAME: &str = ".cph-env";

pub const DEFAULT_HISTORY_DB_NAME: &str = "cph_history.db";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyPathPair {
    pub label: &'static str,
    pub new_path: PathBuf,
    pub legacy_path: PathBuf,
}

/// Resolve the workspace root: `--config` override, else the current
/// directory. The workspace root is where `contest_current/`,
/// `contest_stock/`, `contest_template/`, `.temp/`, and the history
/// database live.
pub fn workspace_root(config_override: Option<&Path>) -> PathBuf {
    match config_override {
        Some(p) => p.to_path_buf(),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

fn choose_read_path(new_path: PathBuf, legacy_path: PathBuf) -> PathBuf {
    if new_path.exists() {
        new_path
    } else if legacy_path.exists() {
        legacy_path
    } else {
        new_path
    }
}

/// Config layer directory for reads: prefers `contest_env/`, falls back
/// to the legacy `.cph-env/` name if only that exists.
pub fn config_dir(workspace_root: &Path) -> PathBuf {
    choose_read_path(
        workspace_root.join(CONFIG_DIR_NAME),
        workspace_root.join(LEGACY_CONFIG_DIR_NAME),
    )
}

pub fn contest_current_dir(workspace_root: &Path) -> PathBuf {
    workspace_root.join("contest_current")
}

pub fn contest_stock_dir(workspace_root: &Path) -> PathBuf {
    workspace_root.join("contest_stock")
}

pub fn contest_template_dir(workspace_root: &Path) -> PathBuf {
    workspace_root.join("contest_template")
}

pub fn backup_root(workspace_root: &Path) -> PathBuf {
    workspace_root.join(".temp")
}

pub fn history_db_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join(DEFAULT_HISTORY_DB_NAME)
}

/// Optional user-level shared defaults outside any single workspace,
/// resolved via XDG (`~/.config/cph/`). Purely supplementary: absence is
/// not an error, the Config Graph simply has one fewer layer to merge.
pub fn user_shared_config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "cph").map(|d| d.config_dir().to_path_buf())
}

/// Legacy path pairs that should be migrated (legacy exists, canonical
/// does not, or the two have diverged).
pub fn legacy_paths_requiring_migration(workspace_root: &Path) -> Vec<LegacyPathPair> {
    let pair = LegacyPathPair {
        label: "config",
        new_path: workspace_root.join(CONFIG_DIR_NAME),
        legacy_path: workspace_root.join(LEGACY_CONFIG_DIR_NAME),
    };
    if pair.legacy_path.exists() && !pair.new_path.exists() {
        vec![pair]
    } else {
        Vec::new()
    }
}

/// Expand `${VAR-default}` references in a config string against the
/// process environment.
pub fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'{') {
            if let Some(end) = input[i + 2..].find('}') {
                let inner = &input[i + 2..i + 2 + end];
                let (name, default) = match inner.split_once('-') {
                    Some((n, d)) => (n, Some(d)),
                    None => (inner, None),
                };
                let resolved = std::env::var(name).ok().or_else(|| default.map(String::from));
                match resolved {
                    Some(v) => out.push_str(&v),
                    None => {
                        out.push_str("${");
                        out.push_str(inner);
                        out.push('}');
                    }
                }
                i = i + 2 + end + 1;
                continue;
            }
        }
        let ch = input[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_dir_prefers_canonical_when_present() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join(CONFIG_DIR_NAME)).unwrap();
        std::fs::create_dir_all(tmp.path().join(LEGACY_CONFIG_DIR_NAME)).unwrap();
        assert_eq!(config_dir(tmp.path()), tmp.path().join(CONFIG_DIR_NAME));
    }

    #[test]
    fn config_dir_falls_back_to_legacy_when_canonical_missing() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join(LEGACY_CONFIG_DIR_NAME)).unwrap();
        assert_eq!(
            config_dir(tmp.path()),
            tmp.path().join(LEGACY_CONFIG_DIR_NAME)
        );
    }

    #[test]
    fn legacy_paths_requiring_migration_detects_legacy_only() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join(LEGACY_CONFIG_DIR_NAME)).unwrap();
        let pairs = legacy_paths_requiring_migration(tmp.path());
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].label, "config");
    }

    #[test]
    fn legacy_paths_requiring_migration_empty_when_canonical_exists() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join(CONFIG_DIR_NAME)).unwrap();
        assert!(legacy_paths_requiring_migration(tmp.path()).is_empty());
    }

    #[test]
    fn expand_env_vars_uses_default_when_unset() {
        // SAFETY (test-only): no other test in this process reads this var concurrently.
        unsafe {
            std::env::remove_var("CPH_TEST_UNSET_VAR_XYZ");
        }
        let out = expand_env_vars("${CPH_TEST_UNSET_VAR_XYZ-fallback}");
        assert_eq!(out, "fallback");
    }

    #[test]
    fn expand_env_vars_uses_process_env_when_set() {
        // SAFETY (test-only): scoped to this single test, no other thread reads it.
        unsafe {
            std::env::set_var("CPH_TEST_SET_VAR_XYZ", "from-env");
        }
        let out = expand_env_vars("${CPH_TEST_SET_VAR_XYZ-fallback}");
        assert_eq!(out, "from-env");
        unsafe {
            std::env::remove_var("CPH_TEST_SET_VAR_XYZ");
        }
    }

    #[test]
    fn expand_env_vars_leaves_unresolvable_verbatim() {
        unsafe {
            std::env::remove_var("CPH_TEST_NO_DEFAULT_XYZ");
        }
        let out = expand_env_vars("${CPH_TEST_NO_DEFAULT_XYZ}");
        assert_eq!(out, "${CPH_TEST_NO_DEFAULT_XYZ}");
    }
}
