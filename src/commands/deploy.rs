//! Converge a broker to a definitions file

use super::{load_ignore, read_document, write_document};
use crate::Context;
use crate::cli::DeployArgs;
use crate::config::{Config, ENV_BROKER_URL};
use crate::ui;
use anyhow::{Context as _, Result};
use definitions::Index;
use rabbitkit::{DeployOptions, DeployReport, ManagementClient};
use serde_json::Value;

pub fn run(ctx: &Context, args: &DeployArgs, config: &Config) -> Result<()> {
    let options = options(args, config);
    options.validate()?;

    let url = args
        .url
        .as_deref()
        .or(config.broker.url.as_deref())
        .with_context(|| {
            format!("No broker URL. Pass --url, set {ENV_BROKER_URL} or [broker] url in config.toml")
        })?;
    let desired = read_document(&args.desired)?;
    let ignore = load_ignore(args.ignore.as_deref(), config)?;

    let client = ManagementClient::from_url(url)?;
    execute(ctx, &client, &desired, &options, ignore.as_ref(), args.json)
}

/// Deploy options: command-line flags on top of the configured defaults.
pub fn options(args: &DeployArgs, config: &Config) -> DeployOptions {
    let defaults = config.deploy_options();
    DeployOptions {
        dry_run: args.dry_run,
        no_deletions: args.no_deletions || defaults.no_deletions,
        recreate_changed: args.recreate_changed || defaults.recreate_changed,
        jobs: args.jobs.unwrap_or(defaults.jobs),
    }
}

fn execute(
    ctx: &Context,
    client: &ManagementClient,
    desired: &Value,
    options: &DeployOptions,
    ignore: Option<&Index>,
    json: bool,
) -> Result<()> {
    let report = match rabbitkit::deploy(client, desired, options, ignore) {
        Ok(report) => report,
        Err(err) => {
            let category = err.category();
            ui::error(category.description());
            ui::dim(category.advice());
            return Err(err.into());
        }
    };

    if json {
        let value = serde_json::to_value(&report).context("Failed to serialize deploy report")?;
        return write_document(&value, None);
    }
    if !ctx.quiet {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &DeployReport) {
    if report.requests.is_empty() {
        ui::success("Broker already matches the definitions");
        return;
    }

    if report.dry_run {
        ui::header("Dry run: requests that would be sent");
        for request in &report.requests {
            ui::dim(&request.to_string());
        }
        println!();
        ui::info(&format!(
            "{} in {}",
            ui::count(report.requests.len(), "request", "requests"),
            ui::count(report.batches.len(), "batch", "batches")
        ));
        return;
    }

    ui::section("Deployed");
    for batch in &report.batches {
        ui::dim(&batch.to_string());
    }
    println!();
    ui::success(&format!(
        "Sent {}",
        ui::count(report.requests.len(), "request", "requests")
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeployConfig;
    use rabbitkit::MockTransport;
    use serde_json::json;
    use std::path::PathBuf;

    const CTX: Context = Context {
        verbose: 0,
        quiet: true,
    };

    fn args() -> DeployArgs {
        DeployArgs {
            desired: PathBuf::from("desired.json"),
            url: None,
            ignore: None,
            dry_run: false,
            no_deletions: false,
            recreate_changed: false,
            jobs: None,
            json: false,
        }
    }

    #[test]
    fn test_flags_override_config() {
        let config = Config {
            deploy: DeployConfig {
                no_deletions: true,
                recreate_changed: false,
                jobs: 3,
            },
            ..Config::default()
        };
        let options = options(&args(), &config);
        assert!(options.no_deletions);
        assert_eq!(options.jobs, 3);

        let mut flagged = args();
        flagged.jobs = Some(1);
        flagged.dry_run = true;
        let options = super::options(&flagged, &config);
        assert_eq!(options.jobs, 1);
        assert!(options.dry_run);
    }

    #[test]
    fn test_missing_url() {
        let err = run(&CTX, &args(), &Config::default()).unwrap_err();
        assert!(err.to_string().contains("No broker URL"));
    }

    #[test]
    fn test_conflicting_options_fail_before_url() {
        let mut conflicting = args();
        conflicting.no_deletions = true;
        conflicting.recreate_changed = true;
        let err = run(&CTX, &conflicting, &Config::default()).unwrap_err();
        assert!(err.to_string().contains("Option conflict"));
    }

    #[test]
    fn test_execute_dry_run() {
        let mock = MockTransport::with_state(json!({"vhosts": [{"name": "/"}]}), json!([]));
        let client = ManagementClient::new(mock.clone());
        let desired = json!({"vhosts": [{"name": "/"}], "queues": [{"name": "q", "vhost": "/"}]});
        let options = DeployOptions {
            dry_run: true,
            ..DeployOptions::default()
        };
        execute(&CTX, &client, &desired, &options, None, false).unwrap();
        assert!(mock.mutating_calls().is_empty());
    }

    #[test]
    fn test_execute_propagates_rejection() {
        let mock = MockTransport::with_state(json!({}), json!([]));
        mock.fail(rabbitkit::Method::Put, "/api/vhosts/v", 403);
        let client = ManagementClient::new(mock);
        let desired = json!({"vhosts": [{"name": "v"}]});
        let err = execute(&CTX, &client, &desired, &DeployOptions::default(), None, false)
            .unwrap_err();
        let err = err.downcast::<rabbitkit::Error>().unwrap();
        assert_eq!(err.status(), Some(403));
    }
}
