//! Argument Parser (C3): converts a token vector into an
//! [`ExecutionContext`] without requiring a fixed order.
//!
//! Positioned downstream of `clap`'s own flag parsing: the CLI Shell (C9)
//! hands this module whatever positional tokens remain after `clap`
//! consumes `--debug`/`--config`/`--dry-run`/`--verbose`/`--help`/
//! `--version`.

use cph_config::ConfigGraph;
use cph_core::{ContextField, ContextSnapshot, CphError, EnvType, ExecutionContext};

/// Scan `tokens` left to right for the first one matching a child (by key
/// or alias) of `path`; remove it and return its canonical key. Always
/// scans left to right and consumes the first matching token.
fn scan_and_remove(
    tokens: &mut Vec<String>,
    graph: &ConfigGraph,
    path: &str,
) -> Result<Option<String>, CphError> {
    for i in 0..tokens.len() {
        if let Some(canonical) = graph.match_child(path, &tokens[i])? {
            tokens.remove(i);
            return Ok(Some(canonical));
        }
    }
    Ok(None)
}

/// Parse `tokens` into an [`ExecutionContext`], seeded from `snapshot`.
/// Scan-and-remove algorithm, steps 1-6.
pub fn parse(
    tokens: &[String],
    graph: &ConfigGraph,
    snapshot: &ContextSnapshot,
) -> Result<ExecutionContext, CphError> {
    let mut remaining: Vec<String> = tokens.to_vec();
    let mut ctx = ExecutionContext {
        language: snapshot.get(ContextField::Language).map(str::to_string),
        contest_name: snapshot.get(ContextField::ContestName).map(str::to_string),
        problem_name: snapshot.get(ContextField::ProblemName).map(str::to_string),
        command_type: snapshot.get(ContextField::CommandType).map(str::to_string),
        env_type: snapshot
            .get(ContextField::EnvType)
            .and_then(|s| if s == "container" {
                Some(EnvType::Container)
            } else if s == "local" {
                Some(EnvType::Local)
            } else {
                None
            }),
        ..Default::default()
    };

    // Step 2: language, scanned against `languages`.
    if let Some(language) = scan_and_remove(&mut remaining, graph, "languages")? {
        ctx.language = Some(language.clone());
        ctx.mark_user_specified(ContextField::Language);

        // Step 3: env type. Per-language override path checked first, so a
        // language can override the meaning of an alias.
        let per_lang_env_path = format!("languages.{language}.env_types");
        let env_candidate = scan_and_remove(&mut remaining, graph, &per_lang_env_path)?
            .or(scan_and_remove(&mut remaining, graph, "shared.env_types")?);
        if let Some(env) = env_candidate {
            ctx.env_type = Some(match env.as_str() {
                "container" => EnvType::Container,
                _ => EnvType::Local,
            });
            ctx.mark_user_specified(ContextField::EnvType);
        }

        // Step 4: command type, same per-language-first precedence.
        let per_lang_cmd_path = format!("languages.{language}.commands");
        let cmd_candidate = scan_and_remove(&mut remaining, graph, &per_lang_cmd_path)?
            .or(scan_and_remove(&mut remaining, graph, "shared.commands")?);
        if let Some(command) = cmd_candidate {
            ctx.command_type = Some(command);
            ctx.mark_user_specified(ContextField::CommandType);
        }
    }

    // Step 5: remaining positional tokens assign in reverse order.
    match remaining.len() {
        0 => {}
        1 => {
            ctx.problem_name = Some(remaining[0].clone());
            ctx.mark_user_specified(ContextField::ProblemName);
        }
        2 => {
            ctx.contest_name = Some(remaining[0].clone());
            ctx.mark_user_specified(ContextField::ContestName);
            ctx.problem_name = Some(remaining[1].clone());
            ctx.mark_user_specified(ContextField::ProblemName);
        }
        _ => return Err(CphError::ArgTooMany(remaining)),
    }

    // Step 6: required fields with neither a user value nor a snapshot
    // value nor a configured default fail loudly.
    for field in [
        ContextField::Language,
        ContextField::CommandType,
        ContextField::ContestName,
        ContextField::ProblemName,
    ] {
        let present = match field {
            ContextField::Language => ctx.language.is_some(),
            ContextField::CommandType => ctx.command_type.is_some(),
            ContextField::ContestName => ctx.contest_name.is_some(),
            ContextField::ProblemName => ctx.problem_name.is_some(),
            ContextField::EnvType => ctx.env_type.is_some(),
        };
        if !present {
            return Err(CphError::ArgMissingRequiredField(field.to_string()));
        }
    }
    if ctx.env_type.is_none() {
        ctx.env_type = Some(EnvType::Local);
    }

    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cph_config::ConfigGraph;

    fn graph() -> ConfigGraph {
        let layer: toml::Value = toml::from_str(
            r#"
            [languages.python]
            aliases = ["py"]
            [languages.rust]
            aliases = ["rs"]

            [shared.env_types.local]
            aliases = ["l"]
            [shared.env_types.container]
            aliases = ["c"]

            [shared.commands.test]
            aliases = ["t"]
            [shared.commands.submit]
            aliases = ["s"]
            [shared.commands.open]
            aliases = ["o"]
            "#,
        )
        .unwrap();
        ConfigGraph::load([layer])
    }

    fn toks(s: &[&str]) -> Vec<String> {
        s.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn order_independence_over_all_permutations() {
        // The two positionals are assigned by their *relative* order to
        // each other (last -> problem, second-to-last -> contest), so
        // only permutations that keep "abc300" ahead of "a" are expected
        // to agree with the reference context; of the 5! = 120
        // permutations of this token set, exactly half (60) satisfy that
        // and are checked here.
        let base = vec!["python", "local", "test", "abc300", "a"];
        let g = graph();
        let snapshot = ContextSnapshot::default();
        let mut perms = Vec::new();
        permute(&mut base.clone(), 0, &mut perms);
        let ordered_perms: Vec<_> = perms
            .into_iter()
            .filter(|p| {
                let contest_idx = p.iter().position(|&t| t == "abc300").unwrap();
                let problem_idx = p.iter().position(|&t| t == "a").unwrap();
                contest_idx < problem_idx
            })
            .collect();

        let reference = parse(&toks(&base), &g, &snapshot).unwrap();
        for p in &ordered_perms {
            let ctx = parse(&toks(p), &g, &snapshot).unwrap();
            assert_eq!(ctx.language, reference.language);
            assert_eq!(ctx.command_type, reference.command_type);
            assert_eq!(ctx.env_type, reference.env_type);
            assert_eq!(ctx.contest_name, reference.contest_name);
            assert_eq!(ctx.problem_name, reference.problem_name);
        }
        assert_eq!(ordered_perms.len(), 60);
    }

    fn permute<'a>(arr: &mut Vec<&'a str>, k: usize, out: &mut Vec<Vec<&'a str>>) {
        if k == arr.len() {
            out.push(arr.clone());
            return;
        }
        for i in k..arr.len() {
            arr.swap(k, i);
            permute(arr, k + 1, out);
            arr.swap(k, i);
        }
    }

    #[test]
    fn flexible_args_all_permutations_agree() {
        let g = graph();
        let snapshot = ContextSnapshot::default();
        let a = parse(&toks(&["py", "t", "local", "abc300", "a"]), &g, &snapshot).unwrap();
        let b = parse(&toks(&["abc300", "a", "py", "t", "local"]), &g, &snapshot).unwrap();
        let c = parse(&toks(&["local", "t", "abc300", "py", "a"]), &g, &snapshot).unwrap();
        for ctx in [&a, &b, &c] {
            assert_eq!(ctx.language.as_deref(), Some("python"));
            assert_eq!(ctx.command_type.as_deref(), Some("test"));
            assert_eq!(ctx.env_type, Some(EnvType::Local));
            assert_eq!(ctx.contest_name.as_deref(), Some("abc300"));
            assert_eq!(ctx.problem_name.as_deref(), Some("a"));
        }
    }

    #[test]
    fn too_many_positional_tokens_errors() {
        let g = graph();
        let snapshot = ContextSnapshot::default();
        let err = parse(
            &toks(&["python", "test", "abc300", "a", "extra"]),
            &g,
            &snapshot,
        )
        .unwrap_err();
        assert_eq!(err.code(), "ARG_TOO_MANY");
    }

    #[test]
    fn missing_required_field_without_snapshot_or_default() {
        let g = graph();
        let snapshot = ContextSnapshot::default();
        let err = parse(&toks(&["abc300", "a"]), &g, &snapshot).unwrap_err();
        assert_eq!(err.code(), "ARG_MISSING_REQUIRED_FIELD");
    }

    #[test]
    fn snapshot_fills_in_unspecified_fields() {
        let g = graph();
        let mut snapshot = ContextSnapshot::default();
        snapshot
            .values
            .insert("language".into(), Some("rust".into()));
        let ctx = parse(&toks(&["test", "abc300", "a"]), &g, &snapshot).unwrap();
        assert_eq!(ctx.language.as_deref(), Some("rust"));
        assert!(!ctx.is_user_specified(ContextField::Language));
        assert!(ctx.is_user_specified(ContextField::CommandType));
    }

    #[test]
    fn single_positional_token_is_problem_name_only() {
        let g = graph();
        let mut snapshot = ContextSnapshot::default();
        snapshot
            .values
            .insert("language".into(), Some("python".into()));
        snapshot
            .values
            .insert("contest_name".into(), Some("abc300".into()));
        let ctx = parse(&toks(&["test", "a"]), &g, &snapshot).unwrap();
        assert_eq!(ctx.problem_name.as_deref(), Some("a"));
        assert_eq!(ctx.contest_name.as_deref(), Some("abc300"));
    }
}
