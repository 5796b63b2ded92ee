//! Offline commands on definitions files: validate, info, apply and merge

use super::{load_ignore, read_document, source_name, write_document};
use crate::Context;
use crate::cli::{ApplyArgs, MergeArgs};
use crate::config::Config;
use crate::ui;
use anyhow::{Context as _, Result, bail};
use definitions::{ApplyOptions, Failure, Index, apply as apply_diff, merge_documents, parse_diff};
use serde_json::Value;
use std::path::Path;

/// Check a definitions file, reporting every failure rather than the first.
pub fn validate(ctx: &Context, file: &Path) -> Result<()> {
    let document = read_document(file)?;
    let failures = check(&document)?;
    let name = source_name(file);

    if failures.is_empty() {
        if !ctx.quiet {
            ui::success(&format!("{name} is valid"));
        }
        return Ok(());
    }
    for failure in &failures {
        ui::error(&failure.to_string());
    }
    bail!(
        "{} found in {name}",
        ui::count(failures.len(), "problem", "problems")
    )
}

/// Failures of a document, after logging resources nothing uses.
fn check(document: &Value) -> Result<Vec<Failure>> {
    let (index, failures) = Index::from_definitions_collecting(document)?;
    for (kind, record) in index.unused() {
        log::warn!("Unused {}", kind.describe(record));
    }
    Ok(failures)
}

/// Print resource counts and the broker version.
pub fn info(_ctx: &Context, file: &Path) -> Result<()> {
    let document = read_document(file)?;
    let (index, failures) = Index::from_definitions_collecting(&document)?;

    ui::header(&source_name(file));
    ui::kv("version", index.version().unwrap_or("unknown"));
    for (kind, count) in index.summary().iter() {
        ui::kv(kind.plural(), &count.to_string());
    }
    if !failures.is_empty() {
        println!();
        ui::warn(&format!(
            "{} (run validate for details)",
            ui::count(failures.len(), "problem", "problems")
        ));
    }
    Ok(())
}

/// Patch a definitions file with a diff.
pub fn apply(ctx: &Context, args: &ApplyArgs) -> Result<()> {
    let diff = parse_diff(read_document(&args.diff)?)
        .with_context(|| format!("Could not load diff {}", source_name(&args.diff)))?;
    let mut document = read_document(&args.definitions)?;

    apply_diff(&diff, &mut document, ApplyOptions { revert: args.revert })?;
    write_document(&document, args.output.as_deref())?;

    if let Some(output) = &args.output
        && !ctx.quiet
    {
        let verb = if args.revert { "Reverted" } else { "Applied" };
        ui::success(&format!(
            "{verb} {} to {}",
            ui::count(diff.summary().total(), "change", "changes"),
            output.display()
        ));
    }
    Ok(())
}

/// Merge definitions files into one document.
pub fn merge(ctx: &Context, args: &MergeArgs, config: &Config) -> Result<()> {
    let ignore = load_ignore(args.ignore.as_deref(), config)?;
    let documents = args
        .files
        .iter()
        .map(|path| Ok((source_name(path), read_document(path)?)))
        .collect::<Result<Vec<(String, Value)>>>()?;

    let index = merge_documents(
        ignore.as_ref(),
        documents.iter().map(|(name, document)| (name.as_str(), document)),
    )
    .context("Merge failed")?;
    write_document(&index.to_definitions(), args.output.as_deref())?;

    if let Some(output) = &args.output
        && !ctx.quiet
    {
        ui::success(&format!(
            "Merged {} into {}",
            ui::count(documents.len(), "file", "files"),
            output.display()
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    const CTX: Context = Context {
        verbose: 0,
        quiet: true,
    };

    fn write_json(dir: &Path, name: &str, value: &Value) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, value.to_string()).unwrap();
        path
    }

    #[test]
    fn test_check_collects_every_failure() {
        let document = json!({
            "vhosts": [{"name": "/"}],
            "queues": [{"name": "q", "vhost": "missing"}],
            "permissions": [{"user": "ghost", "vhost": "/", "configure": "", "write": "", "read": ""}]
        });
        let failures = check(&document).unwrap();
        assert_eq!(failures.len(), 2);
    }

    #[test]
    fn test_validate() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_json(dir.path(), "good.json", &json!({"vhosts": [{"name": "/"}]}));
        validate(&CTX, &good).unwrap();

        let bad = write_json(
            dir.path(),
            "bad.json",
            &json!({"queues": [{"name": "q", "vhost": "missing"}]}),
        );
        let err = validate(&CTX, &bad).unwrap_err();
        assert!(err.to_string().starts_with("1 problem found"));
    }

    #[test]
    fn test_merge_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let base = write_json(
            dir.path(),
            "base.json",
            &json!({"rabbit_version": "3.13.7", "vhosts": [{"name": "/"}]}),
        );
        let app = write_json(
            dir.path(),
            "app.json",
            &json!({"queues": [{"name": "q", "vhost": "/", "durable": true}]}),
        );
        let output = dir.path().join("merged.json");
        let args = MergeArgs {
            files: vec![base, app],
            ignore: None,
            output: Some(output.clone()),
        };
        merge(&CTX, &args, &Config::default()).unwrap();

        let merged = read_document(&output).unwrap();
        assert_eq!(merged["rabbit_version"], "3.13.7");
        assert_eq!(merged["vhosts"].as_array().unwrap().len(), 1);
        assert_eq!(merged["queues"][0]["name"], "q");
    }

    #[test]
    fn test_merge_reports_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let document = json!({"vhosts": [{"name": "/"}]});
        let a = write_json(dir.path(), "a.json", &document);
        let b = write_json(dir.path(), "b.json", &document);
        let args = MergeArgs {
            files: vec![a, b],
            ignore: None,
            output: Some(dir.path().join("out.json")),
        };
        let err = merge(&CTX, &args, &Config::default()).unwrap_err();
        assert!(format!("{err:#}").contains("Duplicate"));
    }

    #[test]
    fn test_apply_and_revert() {
        let dir = tempfile::tempdir().unwrap();
        let diff = write_json(
            dir.path(),
            "diff.json",
            &json!({"added": {"queues": [{"name": "new", "vhost": "/"}]}}),
        );
        let original = json!({"vhosts": [{"name": "/"}], "queues": []});
        let definitions = write_json(dir.path(), "definitions.json", &original);
        let patched = dir.path().join("patched.json");

        apply(
            &CTX,
            &ApplyArgs {
                diff: diff.clone(),
                definitions,
                revert: false,
                output: Some(patched.clone()),
            },
        )
        .unwrap();
        assert_eq!(read_document(&patched).unwrap()["queues"][0]["name"], "new");

        let restored = dir.path().join("restored.json");
        apply(
            &CTX,
            &ApplyArgs {
                diff,
                definitions: patched,
                revert: true,
                output: Some(restored.clone()),
            },
        )
        .unwrap();
        assert_eq!(read_document(&restored).unwrap(), original);
    }
}
