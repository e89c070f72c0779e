//! Embedded default workflow document, merged with an optional on-disk
//! override the same way [`cph_config::merge`] layers TOML (the same
//! merge order, generalized to the JSON workflow document): mappings
//! merge recursively, scalars/arrays replace.

use std::path::Path;

use serde_json::Value;

use cph_core::CphError;

use crate::template::WorkflowDocument;

/// Ships workflows for the three languages the system-defaults TOML layer
/// (`cph_config::defaults::SYSTEM_DEFAULTS_TOML`) declares, `local` env
/// only — container workflows are left to the user's own override file,
/// since the image/command a container run needs is project-specific.
pub const DEFAULT_WORKFLOWS_JSON: &str = r#"
{
  "rust": {
    "open": {
      "local": [
        {"kind": "MKDIR", "args": {"path": "{current}"}},
        {"kind": "COPY", "args": {"src": "{stock}/*", "dst": "{current}"}, "when": "test -d {stock}"},
        {"kind": "COPY", "args": {"src": "{template}/*", "dst": "{current}"}, "when": "test ! -d {stock}"},
        {"kind": "MKDIR", "args": {"path": "{current}/test"}},
        {"kind": "SUBMIT_FETCH", "args": {"url": "https://atcoder.jp/contests/{contest}/tasks/{contest}_{problem}", "dir": "{current}/test"}, "allow_failure": true},
        {"kind": "EDITOR_OPEN", "args": {"path": "{current}/{source_file_name}"}, "allow_failure": true}
      ]
    },
    "test": {
      "local": [
        {"kind": "TEST", "args": {"command": "rustc -O -o main {source_file_name} && ./main", "cwd": "{current}"}}
      ]
    },
    "submit": {
      "local": [
        {"kind": "SUBMIT_FETCH", "args": {"url": "https://atcoder.jp/contests/{contest}/tasks/{contest}_{problem}", "source": "{current}/{source_file_name}", "language_id": "{language_id}"}}
      ]
    }
  },
  "python": {
    "open": {
      "local": [
        {"kind": "MKDIR", "args": {"path": "{current}"}},
        {"kind": "COPY", "args": {"src": "{stock}/*", "dst": "{current}"}, "when": "test -d {stock}"},
        {"kind": "COPY", "args": {"src": "{template}/*", "dst": "{current}"}, "when": "test ! -d {stock}"},
        {"kind": "MKDIR", "args": {"path": "{current}/test"}},
        {"kind": "SUBMIT_FETCH", "args": {"url": "https://atcoder.jp/contests/{contest}/tasks/{contest}_{problem}", "dir": "{current}/test"}, "allow_failure": true},
        {"kind": "EDITOR_OPEN", "args": {"path": "{current}/{source_file_name}"}, "allow_failure": true}
      ]
    },
    "test": {
      "local": [
        {"kind": "TEST", "args": {"command": "python3 {source_file_name}", "cwd": "{current}"}}
      ]
    },
    "submit": {
      "local": [
        {"kind": "SUBMIT_FETCH", "args": {"url": "https://atcoder.jp/contests/{contest}/tasks/{contest}_{problem}", "source": "{current}/{source_file_name}", "language_id": "{language_id}"}}
      ]
    }
  },
  "pypy": {
    "open": {
      "local": [
        {"kind": "MKDIR", "args": {"path": "{current}"}},
        {"kind": "COPY", "args": {"src": "{stock}/*", "dst": "{current}"}, "when": "test -d {stock}"},
        {"kind": "COPY", "args": {"src": "{template}/*", "dst": "{current}"}, "when": "test ! -d {stock}"},
        {"kind": "MKDIR", "args": {"path": "{current}/test"}},
        {"kind": "SUBMIT_FETCH", "args": {"url": "https://atcoder.jp/contests/{contest}/tasks/{contest}_{problem}", "dir": "{current}/test"}, "allow_failure": true},
        {"kind": "EDITOR_OPEN", "args": {"path": "{current}/{source_file_name}"}, "allow_failure": true}
      ]
    },
    "test": {
      "local": [
        {"kind": "TEST", "args": {"command": "pypy3 {source_file_name}", "cwd": "{current}"}}
      ]
    },
    "submit": {
      "local": [
        {"kind": "SUBMIT_FETCH", "args": {"url": "https://atcoder.jp/contests/{contest}/tasks/{contest}_{problem}", "source": "{current}/{source_file_name}", "language_id": "{language_id}"}}
      ]
    }
  }
}
"#;

/// Merge `overlay` onto `base`. Objects merge key-by-key, recursing into
/// nested objects; anything else in `overlay` replaces `base` outright.
fn merge_json_values(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_val) in overlay_map {
                let merged_val = match base_map.remove(&key) {
                    Some(base_val) => merge_json_values(base_val, overlay_val),
                    None => overlay_val,
                };
                base_map.insert(key, merged_val);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

fn parse_value(json: &str, label: &str) -> Result<Value, CphError> {
    serde_json::from_str(json).map_err(|e| CphError::PlanInvalidStepArgs {
        kind: label.to_string(),
        reason: e.to_string(),
    })
}

/// Load the workflow document: the embedded defaults, with `override_path`
/// (when it exists) merged on top. Mirrors `cph_config::load::load_config_graph`'s
/// defaults-then-optional-override layering, one step up in the format
/// (JSON workflow document rather than TOML config layers).
pub fn load(override_path: Option<&Path>) -> Result<WorkflowDocument, CphError> {
    let base = parse_value(DEFAULT_WORKFLOWS_JSON, "<default workflows>")?;

    let merged = match override_path {
        Some(path) if path.is_file() => {
            let content = std::fs::read_to_string(path)
                .map_err(|e| CphError::ConfigNotFound(format!("{}: {e}", path.display())))?;
            let overlay = parse_value(&content, "<workflow override>")?;
            merge_json_values(base, overlay)
        }
        _ => base,
    };

    let text = serde_json::to_string(&merged).map_err(|e| CphError::PlanInvalidStepArgs {
        kind: "<workflow document>".to_string(),
        reason: e.to_string(),
    })?;
    WorkflowDocument::parse(&text)
}
