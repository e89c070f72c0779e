//! `cph init`: scaffold a workspace's `contest_env/` configuration layer
//! (the shared and per-language layers): write files, report what was
//! created, never clobber silently.

use std::path::Path;

use cph_core::CphError;

const SHARED_TOML: &str = r#"# Workspace overrides merged over the embedded system defaults.
# Uncomment and edit any key; unset keys fall through to the defaults.

# [shared.paths]
# current = "contest_current"
# stock = "contest_stock/{language}/{contest}/{problem}"
# template = "contest_template/{language}"

# [executor]
# max_workers = 4
# container_binary = "docker"
"#;

const RUST_LANGUAGE_TOML: &str = r#"# Overrides for languages.rust. Delete this file to fall back to the
# embedded default (source_file_name = "main.rs", run_command = "./main").

# toolchain_binary = "rustc"
"#;

fn write_scaffold_file(path: &Path, content: &str, force: bool) -> Result<bool, CphError> {
    if path.exists() && !force {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| CphError::DriverFilesystem { path: parent.to_path_buf(), reason: e.to_string() })?;
    }
    std::fs::write(path, content)
        .map_err(|e| CphError::DriverFilesystem { path: path.to_path_buf(), reason: e.to_string() })?;
    Ok(true)
}

pub fn run(workspace_root: &Path, force: bool) -> Result<(), CphError> {
    let config_dir = cph_config::paths::config_dir(workspace_root);

    let shared_path = config_dir.join("shared.toml");
    if write_scaffold_file(&shared_path, SHARED_TOML, force)? {
        println!("created {}", shared_path.display());
    } else {
        println!("skipped {} (already exists)", shared_path.display());
    }

    let rust_lang_path = config_dir.join("languages").join("rust.toml");
    if write_scaffold_file(&rust_lang_path, RUST_LANGUAGE_TOML, force)? {
        println!("created {}", rust_lang_path.display());
    } else {
        println!("skipped {} (already exists)", rust_lang_path.display());
    }

    for dir in [
        cph_config::paths::contest_current_dir(workspace_root),
        cph_config::paths::contest_stock_dir(workspace_root),
        cph_config::paths::contest_template_dir(workspace_root),
    ] {
        std::fs::create_dir_all(&dir)
            .map_err(|e| CphError::DriverFilesystem { path: dir.clone(), reason: e.to_string() })?;
        println!("ensured {}", dir.display());
    }

    println!("Workspace initialized at {}", workspace_root.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaffolds_fresh_workspace() {
        let tmp = tempfile::tempdir().unwrap();
        run(tmp.path(), false).unwrap();
        assert!(tmp.path().join("contest_env/shared.toml").exists());
        assert!(tmp.path().join("contest_env/languages/rust.toml").exists());
        assert!(tmp.path().join("contest_current").is_dir());
    }

    #[test]
    fn refuses_to_overwrite_without_force() {
        let tmp = tempfile::tempdir().unwrap();
        run(tmp.path(), false).unwrap();
        let shared_path = tmp.path().join("contest_env/shared.toml");
        std::fs::write(&shared_path, "# custom\n").unwrap();
        run(tmp.path(), false).unwrap();
        assert_eq!(std::fs::read_to_string(&shared_path).unwrap(), "# custom\n");
    }

    #[test]
    fn force_overwrites_existing_files() {
        let tmp = tempfile::tempdir().unwrap();
        run(tmp.path(), false).unwrap();
        let shared_path = tmp.path().join("contest_env/shared.toml");
        std::fs::write(&shared_path, "# custom\n").unwrap();
        run(tmp.path(), true).unwrap();
        assert_eq!(std::fs::read_to_string(&shared_path).unwrap(), SHARED_TOML);
    }
}
