//! Embedded system-defaults layer, shipped with the binary rather than
//! read from disk: the contest/problem/language triple, file pattern
//! groups, and aliased command definitions a fresh workspace needs
//! before any `contest_env/` file exists.

/// The system-defaults TOML layer, merged first (lowest priority) by
/// [`crate::ConfigGraph::load`].
pub const SYSTEM_DEFAULTS_TOML: &str = r#"
[languages.rust]
aliases = ["rs"]
source_file_name = "main.rs"
run_command = "./main"
compile_command = "rustc -O -o main main.rs"
language_id = "5054"

[languages.python]
aliases = ["py"]
source_file_name = "main.py"
run_command = "python3 main.py"
language_id = "5055"

[languages.pypy]
aliases = ["pypy3"]
source_file_name = "main.py"
run_command = "pypy3 main.py"
language_id = "5078"

[shared.env_types.local]
aliases = ["l"]

[shared.env_types.container]
aliases = ["c", "docker"]

[shared.commands.open]
aliases = ["o"]

[shared.commands.test]
aliases = ["t"]

[shared.commands.submit]
aliases = ["s"]

[shared.commands.init]
aliases = ["i"]

[shared.file_patterns]
test_files = ["test_*.txt", "test_*.in"]
contest_files = ["main.*", "Cargo.toml"]
build_artifacts = ["main", "*.o", "target/"]

[shared.paths]
workspace = "."
current = "contest_current"
stock = "contest_stock/{language}/{contest}/{problem}"
template = "contest_template/{language}"

[output]
preset = "default"
format = "text"

[executor]
max_workers = 4
grace_period_ms = 5000
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_defaults_parse_as_valid_toml() {
        let parsed: Result<toml::Value, _> = toml::from_str(SYSTEM_DEFAULTS_TOML);
        assert!(parsed.is_ok(), "{:?}", parsed.err());
    }

    #[test]
    fn system_defaults_declare_rust_and_python() {
        let parsed: toml::Value = toml::from_str(SYSTEM_DEFAULTS_TOML).unwrap();
        assert!(parsed["languages"]["rust"].is_table());
        assert!(parsed["languages"]["python"].is_table());
    }
}
