//! Template Expander (C2): substitutes `{name}` tokens against a context
//! mapping; a related but distinct operation expands glob file patterns
//! into an ordered file list.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use cph_core::CphError;

/// Expand `{name}` tokens in `template` against `ctx`. Returns the
/// expanded string and the set of keys that had no mapping. When `strict`
/// is set, any unresolved key is a [`CphError::ConfigUnresolvedTemplate`];
/// otherwise unresolved tokens are left verbatim and reported.
pub fn expand(
    template: &str,
    ctx: &HashMap<String, String>,
    strict: bool,
) -> Result<(String, Vec<String>), CphError> {
    let mut out = String::with_capacity(template.len());
    let mut unresolved = Vec::new();
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some(end) = template[i + 1..].find('}') {
                let name = &template[i + 1..i + 1 + end];
                let is_ident = !name.is_empty()
                    && name
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_');
                if is_ident {
                    match ctx.get(name) {
                        Some(value) => out.push_str(value),
                        None => {
                            unresolved.push(name.to_string());
                            out.push('{');
                            out.push_str(name);
                            out.push('}');
                        }
                    }
                    i = i + 1 + end + 1;
                    continue;
                }
            }
        }
        // Push one char (not necessarily one byte) at a time.
        let ch = template[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }

    if strict && !unresolved.is_empty() {
        return Err(CphError::ConfigUnresolvedTemplate {
            template: template.to_string(),
            unresolved,
        });
    }

    Ok((out, unresolved))
}

/// Expand a glob-metacharacter pattern rooted at `base` into an ordered
/// (lexicographic by path) list of matching files.
pub fn expand_file_pattern(pattern: &str, base: &Path) -> Result<Vec<PathBuf>, CphError> {
    let full_pattern = base.join(pattern);
    let pattern_str = full_pattern.to_string_lossy().to_string();
    let mut matches: Vec<PathBuf> = glob::glob(&pattern_str)
        .map_err(|e| CphError::PlanInvalidStepArgs {
            kind: "glob".to_string(),
            reason: e.to_string(),
        })?
        .filter_map(|entry| entry.ok())
        .collect();
    matches.sort();
    Ok(matches)
}
