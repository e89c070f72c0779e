//! Deep merge of TOML layer documents: mappings merge
//! recursively, scalars and sequences replace.

/// Merge `overlay` onto `base`. Tables merge key-by-key, recursing into
/// nested tables; any other value type in `overlay` replaces the one in
/// `base` outright (scalars and arrays are not merged element-wise).
pub fn merge_toml_values(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_map), toml::Value::Table(overlay_map)) => {
            for (key, overlay_val) in overlay_map {
                let merged_val = match base_map.remove(&key) {
                    Some(base_val) => merge_toml_values(base_val, overlay_val),
                    None => overlay_val,
                };
                base_map.insert(key, merged_val);
            }
            toml::Value::Table(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Fold a sequence of layers (earliest first) into one materialized
/// document, in merge order: system defaults,
/// shared environment config, per-language environment config, runtime
/// overlay.
pub fn merge_layers(layers: impl IntoIterator<Item = toml::Value>) -> toml::Value {
    layers
        .into_iter()
        .fold(toml::Value::Table(toml::map::Map::new()), merge_toml_values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use toml::Value;

    fn table(pairs: &[(&str, Value)]) -> Value {
        let mut m = toml::map::Map::new();
        for (k, v) in pairs {
            m.insert((*k).to_string(), v.clone());
        }
        Value::Table(m)
    }

    #[test]
    fn scalar_overlay_replaces_base() {
        let base = table(&[("x", Value::Integer(1))]);
        let overlay = table(&[("x", Value::Integer(2))]);
        let merged = merge_toml_values(base, overlay);
        assert_eq!(merged.get("x").unwrap().as_integer(), Some(2));
    }

    #[test]
    fn nested_tables_merge_recursively() {
        let base = table(&[(
            "languages",
            table(&[(
                "rust",
                table(&[("run_command", Value::String("cargo run".into()))]),
            )]),
        )]);
        let overlay = table(&[(
            "languages",
            table(&[(
                "rust",
                table(&[("language_id", Value::String("5054".into()))]),
            )]),
        )]);
        let merged = merge_toml_values(base, overlay);
        let rust = &merged["languages"]["rust"];
        assert_eq!(rust["run_command"].as_str(), Some("cargo run"));
        assert_eq!(rust["language_id"].as_str(), Some("5054"));
    }

    #[test]
    fn array_is_replaced_not_concatenated() {
        let base = table(&[(
            "aliases",
            Value::Array(vec![Value::String("py".into())]),
        )]);
        let overlay = table(&[(
            "aliases",
            Value::Array(vec![Value::String("python3".into())]),
        )]);
        let merged = merge_toml_values(base, overlay);
        let arr = merged["aliases"].as_array().unwrap();
        assert_eq!(arr.len(), 1);
        assert_eq!(arr[0].as_str(), Some("python3"));
    }

    #[test]
    fn merge_layers_applies_in_order() {
        let l1 = table(&[("a", Value::Integer(1)), ("b", Value::Integer(1))]);
        let l2 = table(&[("b", Value::Integer(2))]);
        let l3 = table(&[("c", Value::Integer(3))]);
        let merged = merge_layers([l1, l2, l3]);
        assert_eq!(merged["a"].as_integer(), Some(1));
        assert_eq!(merged["b"].as_integer(), Some(2));
        assert_eq!(merged["c"].as_integer(), Some(3));
    }

    #[test]
    fn merge_layers_empty_yields_empty_table() {
        let merged = merge_layers(Vec::<Value>::new());
        assert!(merged.as_table().unwrap().is_empty());
    }
}
