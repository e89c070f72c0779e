//! Assembles a [`ConfigGraph`] from four layers:
//! embedded system defaults, `contest_env/shared.toml`, each
//! `contest_env/languages/*.toml`, and (at the caller's discretion) a
//! runtime overlay registered after load.

use std::path::Path;

use cph_core::CphError;

use crate::defaults::SYSTEM_DEFAULTS_TOML;
use crate::graph::ConfigGraph;
use crate::paths;

fn parse_layer(content: &str, source: &str) -> Result<toml::Value, CphError> {
    let expanded = paths::expand_env_vars(content);
    toml::from_str(&expanded).map_err(|e| CphError::ConfigTypeMismatch {
        path: source.to_string(),
        expected: "valid TOML table".to_string(),
        found: e.to_string(),
    })
}

fn read_optional(path: &Path) -> Result<Option<String>, CphError> {
    match std::fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CphError::ConfigNotFound(format!(
            "{}: {e}",
            path.display()
        ))),
    }
}

/// Load the four-layer Config Graph for the workspace rooted at
/// `workspace_root`. Missing layer files are treated as empty layers —
/// only the embedded system defaults are mandatory.
pub fn load_config_graph(workspace_root: &Path) -> Result<ConfigGraph, CphError> {
    let config_dir = paths::config_dir(workspace_root);

    let mut layers = vec![parse_layer(SYSTEM_DEFAULTS_TOML, "<system-defaults>")?];

    if let Some(shared) = read_optional(&config_dir.join("shared.toml"))? {
        layers.push(parse_layer(&shared, "shared.toml")?);
    }

    let languages_dir = config_dir.join("languages");
    if let Ok(entries) = std::fs::read_dir(&languages_dir) {
        let mut files: Vec<_> = entries
            .flatten()
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "toml"))
            .map(|e| e.path())
            .collect();
        files.sort();
        for file in files {
            let lang_name = file
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let content = std::fs::read_to_string(&file).map_err(|e| {
                CphError::ConfigNotFound(format!("{}: {e}", file.display()))
            })?;
            let value = parse_layer(&content, &file.display().to_string())?;
            // Per-language override files are scoped under `languages.<name>`
            // even though the file itself just lists the language's own keys.
            let mut wrapper = toml::map::Map::new();
            let mut languages = toml::map::Map::new();
            languages.insert(lang_name, value);
            wrapper.insert("languages".to_string(), toml::Value::Table(languages));
            layers.push(toml::Value::Table(wrapper));
        }
    }

    Ok(ConfigGraph::load(layers))
}
