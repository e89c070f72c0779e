//! Config Graph (C1): a merged tree of keyed, aliased nodes exposing typed,
//! memoized resolution.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use cph_core::CphError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::merge::merge_layers;

/// A dynamically-typed configuration value, tagged with its resolved type:
/// every [`ConfigGraph::resolve`] call names the type it expects, so a
/// mismatch fails at the point of use rather than silently coercing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    String(String),
    Integer(i64),
    Boolean(bool),
    StringList(Vec<String>),
}

impl ConfigValue {
    fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Integer(_) => "integer",
            Self::Boolean(_) => "boolean",
            Self::StringList(_) => "string-sequence",
        }
    }

    fn from_toml(v: &toml::Value) -> Option<Self> {
        match v {
            toml::Value::String(s) => Some(Self::String(s.clone())),
            toml::Value::Integer(i) => Some(Self::Integer(*i)),
            toml::Value::Boolean(b) => Some(Self::Boolean(*b)),
            toml::Value::Array(arr) => {
                let strs: Option<Vec<String>> = arr
                    .iter()
                    .map(|item| item.as_str().map(|s| s.to_string()))
                    .collect();
                strs.map(Self::StringList)
            }
            _ => None,
        }
    }
}

/// The type a caller expects back from [`ConfigGraph::resolve`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeTag {
    String,
    Integer,
    Boolean,
    StringList,
}

/// A node in the Config Graph. Every non-root node has
/// exactly one parent (enforced by tree construction, not stored); alias
/// sets never overlap between sibling nodes of the same parent (enforced
/// in [`ConfigNode::insert_child`]); mutation occurs only during load and
/// overlay application.
#[derive(Clone, Debug, Default)]
pub struct ConfigNode {
    pub key: String,
    pub value: Option<ConfigValue>,
    pub children: IndexMap<String, ConfigNode>,
    pub aliases: HashSet<String>,
}

impl ConfigNode {
    fn leaf(key: &str, value: ConfigValue) -> Self {
        Self {
            key: key.to_string(),
            value: Some(value),
            children: IndexMap::new(),
            aliases: HashSet::new(),
        }
    }

    /// Build a node tree from a merged TOML table. `aliases` arrays nested
    /// under a key's own `aliases` field (e.g. `languages.rust.aliases =
    /// ["rs"]`) register on that key's node rather than becoming a child.
    fn from_toml_table(key: &str, table: &toml::value::Table) -> Self {
        let mut node = Self {
            key: key.to_string(),
            value: None,
            children: IndexMap::new(),
            aliases: HashSet::new(),
        };
        for (child_key, child_val) in table {
            if child_key == "aliases" {
                if let Some(arr) = child_val.as_array() {
                    for a in arr {
                        if let Some(s) = a.as_str() {
                            node.aliases.insert(s.to_string());
                        }
                    }
                }
                continue;
            }
            let child_node = match child_val {
                toml::Value::Table(t) => Self::from_toml_table(child_key, t),
                other => match ConfigValue::from_toml(other) {
                    Some(cv) => Self::leaf(child_key, cv),
                    None => continue,
                },
            };
            node.children.insert(child_key.clone(), child_node);
        }
        node
    }

    /// Candidates at this level matching `segment`: exact key match wins
    /// over alias match; among non-exact alias matches, ambiguity is an
    /// error.
    fn resolve_segment(&self, segment: &str) -> Result<Option<&ConfigNode>, CphError> {
        if let Some(exact) = self.children.get(segment) {
            return Ok(Some(exact));
        }
        let mut alias_hits: Vec<&ConfigNode> = self
            .children
            .values()
            .filter(|c| c.aliases.contains(segment))
            .collect();
        match alias_hits.len() {
            0 => Ok(None),
            1 => Ok(Some(alias_hits.remove(0))),
            _ => Err(CphError::ConfigAmbiguousAlias {
                path: self.key.clone(),
                alias: segment.to_string(),
            }),
        }
    }
}

/// An append-only stack of `(dotted_path, value)` overlay entries
/// consulted before the underlying graph.
#[derive(Clone, Debug, Default)]
struct OverlayStack {
    entries: Vec<(String, ConfigValue)>,
}

impl OverlayStack {
    fn find(&self, path: &str) -> Option<&ConfigValue> {
        self.entries
            .iter()
            .rev()
            .find(|(p, _)| p == path)
            .map(|(_, v)| v)
    }
}

/// The merged, loaded configuration tree plus a runtime overlay stack and
/// a resolution cache.
pub struct ConfigGraph {
    root: ConfigNode,
    overlay: OverlayStack,
    /// Bumped whenever the overlay stack changes; resolutions are cached
    /// keyed on `(generation, normalized_path, type)` so invalidation is
    /// a counter increment rather than a full cache clear.
    generation: u64,
    cache: RefCell<HashMap<(u64, String, TypeTag), ConfigValue>>,
}

impl ConfigGraph {
    /// Load from layers in merge order (system defaults, shared, per-language,
    /// ...); later layers override earlier ones at identical paths.
    pub fn load(layers: impl IntoIterator<Item = toml::Value>) -> Self {
        let merged = merge_layers(layers);
        let root = match &merged {
            toml::Value::Table(t) => ConfigNode::from_toml_table("", t),
            _ => ConfigNode::default(),
        };
        Self {
            root,
            overlay: OverlayStack::default(),
            generation: 0,
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Walk `path` segment by segment, matching each by exact key or alias.
    fn walk(&self, path: &str) -> Result<&ConfigNode, CphError> {
        let mut node = &self.root;
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            match node.resolve_segment(segment)? {
                Some(next) => node = next,
                None => return Err(CphError::ConfigNotFound(path.to_string())),
            }
        }
        Ok(node)
    }

    fn coerce(path: &str, value: &ConfigValue, tag: TypeTag) -> Result<ConfigValue, CphError> {
        let ok = matches!(
            (value, tag),
            (ConfigValue::String(_), TypeTag::String)
                | (ConfigValue::Integer(_), TypeTag::Integer)
                | (ConfigValue::Boolean(_), TypeTag::Boolean)
                | (ConfigValue::StringList(_), TypeTag::StringList)
        );
        if ok {
            Ok(value.clone())
        } else {
            Err(CphError::ConfigTypeMismatch {
                path: path.to_string(),
                expected: format!("{tag:?}"),
                found: value.type_name().to_string(),
            })
        }
    }

    /// Resolve `path` (dot-separated) to a value of the requested type.
    /// Resolve a dotted path to a typed value.
    pub fn resolve(&self, path: &str, tag: TypeTag) -> Result<ConfigValue, CphError> {
        let cache_key = (self.generation, path.to_string(), tag);
        if let Some(hit) = self.cache.borrow().get(&cache_key) {
            return Ok(hit.clone());
        }

        if let Some(overlay_val) = self.overlay.find(path) {
            let coerced = Self::coerce(path, overlay_val, tag)?;
            self.cache.borrow_mut().insert(cache_key, coerced.clone());
            return Ok(coerced);
        }

        let node = self.walk(path)?;
        let value = node
            .value
            .as_ref()
            .ok_or_else(|| CphError::ConfigNotFound(path.to_string()))?;
        let coerced = Self::coerce(path, value, tag)?;
        self.cache.borrow_mut().insert(cache_key, coerced.clone());
        Ok(coerced)
    }

    pub fn resolve_string(&self, path: &str) -> Result<String, CphError> {
        match self.resolve(path, TypeTag::String)? {
            ConfigValue::String(s) => Ok(s),
            _ => unreachable!("coerce guarantees matching variant"),
        }
    }

    /// Resolve `path` to a string, then expand it through the Template
    /// Expander (C2).
    pub fn resolve_template(
        &self,
        path: &str,
        ctx: &HashMap<String, String>,
    ) -> Result<String, CphError> {
        let template = self.resolve_string(path)?;
        let (expanded, _unresolved) = crate::template::expand(&template, ctx, false)?;
        Ok(expanded)
    }

    /// Ordered child keys under `path`.
    pub fn children(&self, path: &str) -> Result<Vec<String>, CphError> {
        let node = self.walk(path)?;
        Ok(node.children.keys().cloned().collect())
    }

    /// Match `token` against the children of `path` by exact key or alias,
    /// returning the canonical (non-alias) child key. Used by the Argument
    /// Parser's scan-and-remove steps so a token like `py`
    /// resolves to the canonical `python`. Returns `Ok(None)` if `path`
    /// itself does not exist (treated as "no candidates", not an error —
    /// e.g. a language with no per-language command overrides).
    pub fn match_child(&self, path: &str, token: &str) -> Result<Option<String>, CphError> {
        let node = match self.walk(path) {
            Ok(n) => n,
            Err(CphError::ConfigNotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(node.resolve_segment(token)?.map(|n| n.key.clone()))
    }

    /// Push a runtime overlay entry; invalidates the resolution cache.
    pub fn register_overlay(&mut self, path: impl Into<String>, value: ConfigValue) {
        self.overlay.entries.push((path.into(), value));
        self.generation += 1;
    }

    /// Pop every overlay entry; invalidates the resolution cache.
    /// Resolutions after `clear_overlay` are bit-identical to resolutions
    /// before any overlay was pushed.
    pub fn clear_overlay(&mut self) {
        self.overlay.entries.clear();
        self.generation += 1;
    }

    pub fn root(&self) -> &ConfigNode {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_graph() -> ConfigGraph {
        let layer1: toml::Value = toml::from_str(
            r#"
            [languages.python]
            aliases = ["py"]
            run_command = "python3 {source_file_name}"
            language_id = "5055"

            [languages.rust]
            aliases = ["rs"]
            run_command = "cargo run"
            language_id = "5054"

            [commands.test]
            aliases = ["t"]

            [commands.submit]
            aliases = ["s"]

            [shared]
            max_workers = 4
            "#,
        )
        .unwrap();
        ConfigGraph::load([layer1])
    }

    #[test]
    fn resolve_exact_key_path() {
        let g = sample_graph();
        assert_eq!(
            g.resolve_string("languages.python.run_command").unwrap(),
            "python3 {source_file_name}"
        );
    }

    #[test]
    fn resolve_via_alias_equals_resolve_via_key() {
        let g = sample_graph();
        let via_alias = g.resolve_string("languages.py.run_command").unwrap();
        let via_key = g.resolve_string("languages.python.run_command").unwrap();
        assert_eq!(via_alias, via_key);
    }

    #[test]
    fn resolve_not_found() {
        let g = sample_graph();
        let err = g
            .resolve("languages.haskell.run_command", TypeTag::String)
            .unwrap_err();
        assert_eq!(err.code(), "CONFIG_NOT_FOUND");
    }

    #[test]
    fn resolve_type_mismatch() {
        let g = sample_graph();
        let err = g
            .resolve("shared.max_workers", TypeTag::String)
            .unwrap_err();
        assert_eq!(err.code(), "CONFIG_TYPE_MISMATCH");
    }

    #[test]
    fn resolve_ambiguous_alias_errors() {
        let layer: toml::Value = toml::from_str(
            r#"
            [commands.test]
            aliases = ["t"]
            [commands.train]
            aliases = ["t"]
            "#,
        )
        .unwrap();
        let g = ConfigGraph::load([layer]);
        let err = g.resolve("commands.t", TypeTag::String).unwrap_err();
        assert_eq!(err.code(), "CONFIG_AMBIGUOUS_ALIAS");
    }

    #[test]
    fn children_returns_ordered_keys() {
        let g = sample_graph();
        let children = g.children("languages").unwrap();
        assert_eq!(children, vec!["python", "rust"]);
    }

    #[test]
    fn overlay_resolution_takes_priority_over_graph() {
        let mut g = sample_graph();
        g.register_overlay(
            "languages.python.run_command",
            ConfigValue::String("python3 -O {source_file_name}".into()),
        );
        assert_eq!(
            g.resolve_string("languages.python.run_command").unwrap(),
            "python3 -O {source_file_name}"
        );
    }

    #[test]
    fn clear_overlay_restores_pre_overlay_value() {
        let mut g = sample_graph();
        let before = g.resolve_string("languages.python.run_command").unwrap();
        g.register_overlay(
            "languages.python.run_command",
            ConfigValue::String("overridden".into()),
        );
        g.clear_overlay();
        let after = g.resolve_string("languages.python.run_command").unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn later_layer_overrides_earlier_layer_at_same_path() {
        let l1: toml::Value = toml::from_str("[shared]\nmax_workers = 4\n").unwrap();
        let l2: toml::Value = toml::from_str("[shared]\nmax_workers = 8\n").unwrap();
        let g = ConfigGraph::load([l1, l2]);
        match g.resolve("shared.max_workers", TypeTag::Integer).unwrap() {
            ConfigValue::Integer(n) => assert_eq!(n, 8),
            _ => panic!("expected integer"),
        }
    }
}
