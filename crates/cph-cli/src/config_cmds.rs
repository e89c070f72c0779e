//! `cph config show|validate`: render the merged graph
//! (text via `toml`, json via `serde_json::to_string_pretty`) and
//! walk the whole tree reporting every error rather than stopping at
//! the first.

use std::collections::HashMap;

use cph_config::graph::ConfigNode;
use cph_core::{CphError, OutputFormat};

use crate::context::Session;

fn node_to_json(node: &ConfigNode) -> serde_json::Value {
    if node.children.is_empty() {
        return match &node.value {
            Some(cph_config::graph::ConfigValue::String(s)) => serde_json::json!(s),
            Some(cph_config::graph::ConfigValue::Integer(i)) => serde_json::json!(i),
            Some(cph_config::graph::ConfigValue::Boolean(b)) => serde_json::json!(b),
            Some(cph_config::graph::ConfigValue::StringList(list)) => serde_json::json!(list),
            None => serde_json::Value::Null,
        };
    }
    let map: serde_json::Map<String, serde_json::Value> = node
        .children
        .iter()
        .map(|(k, v)| (k.clone(), node_to_json(v)))
        .collect();
    serde_json::Value::Object(map)
}

fn node_to_toml(node: &ConfigNode) -> toml::Value {
    if node.children.is_empty() {
        return match &node.value {
            Some(cph_config::graph::ConfigValue::String(s)) => toml::Value::String(s.clone()),
            Some(cph_config::graph::ConfigValue::Integer(i)) => toml::Value::Integer(*i),
            Some(cph_config::graph::ConfigValue::Boolean(b)) => toml::Value::Boolean(*b),
            Some(cph_config::graph::ConfigValue::StringList(list)) => {
                toml::Value::Array(list.iter().cloned().map(toml::Value::String).collect())
            }
            None => toml::Value::Table(toml::map::Map::new()),
        };
    }
    let mut table = toml::map::Map::new();
    for (k, v) in &node.children {
        table.insert(k.clone(), node_to_toml(v));
    }
    toml::Value::Table(table)
}

pub fn show(session: &Session, format: OutputFormat) -> Result<(), CphError> {
    let root = session.graph.root();
    match format {
        OutputFormat::Json => {
            let value = node_to_json(root);
            println!(
                "{}",
                serde_json::to_string_pretty(&value).unwrap_or_default()
            );
        }
        OutputFormat::Text => {
            let value = node_to_toml(root);
            println!(
                "{}",
                toml::to_string_pretty(&value).unwrap_or_default()
            );
        }
    }
    Ok(())
}

/// Every alias collision among a node's direct children, collected as
/// `(path, alias)` pairs rather than stopping at the first one found.
fn collect_alias_collisions(node: &ConfigNode, path: &str, out: &mut Vec<(String, String)>) {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for child in node.children.values() {
        for alias in &child.aliases {
            *counts.entry(alias.as_str()).or_default() += 1;
        }
    }
    for (alias, count) in counts {
        if count > 1 {
            out.push((path.to_string(), alias.to_string()));
        }
    }
    for (key, child) in &node.children {
        let child_path = if path.is_empty() {
            key.clone()
        } else {
            format!("{path}.{key}")
        };
        collect_alias_collisions(child, &child_path, out);
    }
}

const REQUIRED_LANGUAGE_FIELDS: &[&str] = &["source_file_name", "run_command"];

pub fn validate(session: &Session) -> Result<(), CphError> {
    let mut errors: Vec<String> = Vec::new();

    let mut collisions = Vec::new();
    collect_alias_collisions(session.graph.root(), "", &mut collisions);
    for (path, alias) in &collisions {
        errors.push(format!("ambiguous alias '{alias}' under '{path}'"));
    }

    for language in session.graph.children("languages").unwrap_or_default() {
        for field in REQUIRED_LANGUAGE_FIELDS {
            let full_path = format!("languages.{language}.{field}");
            if let Err(e) = session.graph.resolve_string(&full_path) {
                errors.push(format!("{full_path}: {e}"));
            }
        }
    }

    for path in ["shared.paths.current", "shared.paths.stock", "shared.paths.template"] {
        if let Err(e) = session.graph.resolve_string(path) {
            errors.push(format!("{path}: {e}"));
        }
    }

    if errors.is_empty() {
        eprintln!("config graph valid");
        Ok(())
    } else {
        for e in &errors {
            eprintln!("error: {e}");
        }
        Err(CphError::ConfigTypeMismatch {
            path: "<graph>".to_string(),
            expected: "valid configuration".to_string(),
            found: format!("{} error(s)", errors.len()),
        })
    }
}
