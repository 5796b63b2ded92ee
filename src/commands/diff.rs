//! Compare two definitions files

use super::{load_ignore, read_document, write_document};
use crate::Context;
use crate::cli::DiffArgs;
use crate::config::Config;
use anyhow::{Context as _, Result};
use colored::Colorize;
use definitions::{Diff, Kind, KindMap};
use serde_json::Value;

pub fn run(ctx: &Context, args: &DiffArgs, config: &Config) -> Result<()> {
    let before = read_document(&args.before)?;
    let after = read_document(&args.after)?;
    let ignore = load_ignore(args.ignore.as_deref(), config)?;

    let diff = definitions::diff(&before, &after, ignore.as_ref())?;
    if args.json {
        let value = serde_json::to_value(&diff).context("Failed to serialize diff")?;
        return write_document(&value, None);
    }

    print!("{}", render(&diff, ctx.verbose > 0));
    Ok(())
}

fn total(counts: &KindMap<usize>) -> usize {
    counts.iter().map(|(_, n)| *n).sum()
}

/// Human-readable listing of a diff.
///
/// Changed records show a line diff of their JSON; `full` also lists the
/// unchanged lines.
pub fn render(diff: &Diff, full: bool) -> String {
    if diff.is_empty() {
        return format!("{}\n", "No differences".dimmed());
    }

    let mut out = String::new();
    for kind in Kind::ALL {
        let added = diff.added.get(kind);
        let deleted = diff.deleted.get(kind);
        let changed = diff.changed.get(kind);
        if added.is_empty() && deleted.is_empty() && changed.is_empty() {
            continue;
        }

        out.push_str(&format!("\n{}\n", kind.plural().cyan().bold()));
        for record in added {
            out.push_str(&format!("  {} {}\n", "+".green().bold(), kind.describe(record).green()));
        }
        for record in deleted {
            out.push_str(&format!("  {} {}\n", "-".red().bold(), kind.describe(record).red()));
        }
        for change in changed {
            out.push_str(&format!(
                "  {} {}\n",
                "~".yellow().bold(),
                kind.describe(&change.after).yellow()
            ));
            out.push_str(&record_diff(&change.before, &change.after, full));
        }
    }

    let implicit = &diff.implicitly_affected.bindings;
    if !implicit.is_empty() {
        out.push_str(&format!(
            "\n{}\n",
            "bindings affected by changed endpoints".cyan().bold()
        ));
        for binding in implicit {
            out.push_str(&format!("  {} {}\n", "!".yellow(), Kind::Binding.describe(binding)));
        }
    }

    let summary = diff.summary();
    out.push_str(&format!(
        "\n{} added, {} deleted, {} changed\n",
        total(&summary.added),
        total(&summary.deleted),
        total(&summary.changed)
    ));
    out
}

/// Line diff of two records rendered as pretty JSON.
fn record_diff(before: &Value, after: &Value, full: bool) -> String {
    let pretty = |value: &Value| {
        let mut text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
        text.push('\n');
        text
    };
    let (before, after) = (pretty(before), pretty(after));
    let diff = similar::TextDiff::from_lines(&before, &after);

    let mut out = String::new();
    for change in diff.iter_all_changes() {
        match change.tag() {
            similar::ChangeTag::Delete => {
                out.push_str(&format!("      {}", format!("- {change}").red()));
            }
            similar::ChangeTag::Insert => {
                out.push_str(&format!("      {}", format!("+ {change}").green()));
            }
            similar::ChangeTag::Equal if full => {
                out.push_str(&format!("      {}", format!("  {change}").dimmed()));
            }
            similar::ChangeTag::Equal => {}
        }
    }
    out
}
