//! Ordered deployment of definitions to a broker
//!
//! A deploy diffs the broker's current definitions against the desired
//! ones and turns the diff into batches of requests, one batch per
//! operation and resource kind. Batches run in dependency order: a batch
//! only starts once every request of the previous one has settled, and the
//! first failure stops the deploy after its batch. Within a batch,
//! requests run concurrently on a thread pool.
//!
//! The broker has no transactions, so a failed deploy leaves it partially
//! updated.

use crate::client::ManagementClient;
use crate::error::{Error, Result};
use crate::routes::{Operation, PlannedRequest, request_for};
use definitions::kind::field;
use definitions::{Diff, Index, Keyer, Kind};
use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Default number of concurrent requests per batch.
pub const DEFAULT_JOBS: usize = 8;

/// Kinds the broker can update in place.
const MUTABLE: [Kind; 3] = [Kind::User, Kind::Permission, Kind::TopicPermission];

/// Kinds that must be deleted and recreated to change.
const RECREATED: [Kind; 4] = [Kind::Vhost, Kind::Exchange, Kind::Queue, Kind::Binding];

const CREATE_ORDER: [Kind; 7] = [
    Kind::Vhost,
    Kind::Exchange,
    Kind::Queue,
    Kind::Binding,
    Kind::User,
    Kind::Permission,
    Kind::TopicPermission,
];

const DELETE_ORDER: [Kind; 7] = [
    Kind::Binding,
    Kind::Queue,
    Kind::Exchange,
    Kind::Vhost,
    Kind::User,
    Kind::Permission,
    Kind::TopicPermission,
];

/// Options for [`deploy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeployOptions {
    /// Echo mutating requests instead of sending them.
    pub dry_run: bool,
    /// Leave resources missing from the desired definitions in place.
    pub no_deletions: bool,
    /// Delete and recreate resources whose definition changed.
    pub recreate_changed: bool,
    /// Maximum concurrent requests per batch.
    pub jobs: usize,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            no_deletions: false,
            recreate_changed: false,
            jobs: DEFAULT_JOBS,
        }
    }
}

impl DeployOptions {
    /// Check the options make sense together.
    ///
    /// # Errors
    ///
    /// Returns `Error::OptionConflict` when both `no_deletions` and
    /// `recreate_changed` are set, and `Error::InvalidOptions` when
    /// `jobs` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.no_deletions && self.recreate_changed {
            return Err(Error::OptionConflict(
                "--no-deletions and --recreate-changed both enabled.".to_string(),
            ));
        }
        if self.jobs == 0 {
            return Err(Error::InvalidOptions("jobs must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Requests for one operation on one kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Batch {
    pub operation: Operation,
    pub kind: Kind,
    /// Part of deleting and recreating changed resources.
    pub recreate: bool,
    pub requests: Vec<PlannedRequest>,
}

/// How a batch went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub operation: Operation,
    pub kind: Kind,
    pub recreate: bool,
    pub succeeded: usize,
    pub failed: usize,
}

impl fmt::Display for BatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.recreate {
            write!(f, "{}(for changing)", self.operation)?;
        } else {
            write!(f, "{}", self.operation)?;
        }
        write!(f, " {} {}", self.succeeded, self.kind.plural())?;
        if self.failed > 0 {
            write!(f, ", {} failed", self.failed)?;
        }
        Ok(())
    }
}

/// What a deploy did, or in a dry run would have done.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeployReport {
    pub dry_run: bool,
    /// Mutating requests in issue order.
    pub requests: Vec<PlannedRequest>,
    pub batches: Vec<BatchOutcome>,
    pub warnings: Vec<String>,
}

/// Diff the broker's definitions against `desired`.
///
/// Deleted bindings get the broker's `properties_key`, which the
/// definitions export omits but binding deletion needs.
pub fn diff_server(client: &ManagementClient, desired: &Value, ignore: Option<&Index>) -> Result<Diff> {
    let (bindings, current) = rayon::join(|| client.bindings(), || client.definitions());
    let (bindings, current) = (bindings?, current?);

    let properties_keys: HashMap<String, String> = bindings
        .iter()
        .filter_map(|binding| {
            let key = Kind::Binding.key(binding).ok()?;
            let properties_key = field(binding, "properties_key")?;
            Some((key, properties_key.to_string()))
        })
        .collect();

    let mut diff = definitions::diff(&current, desired, ignore)?;
    for binding in &mut diff.deleted.bindings {
        let properties_key = Kind::Binding
            .key(binding)
            .ok()
            .and_then(|key| properties_keys.get(&key))
            .cloned();
        let Some(properties_key) = properties_key else {
            log::warn!(
                "Cannot find properties_key for {}",
                Kind::Binding.describe(binding)
            );
            continue;
        };
        if let Some(record) = binding.as_object_mut() {
            record.insert("properties_key".to_string(), Value::String(properties_key));
        }
    }
    Ok(diff)
}

/// Warnings about a diff that a deploy with `options` would not fully act on.
pub fn warnings(diff: &Diff, options: &DeployOptions) -> Vec<String> {
    let mut warnings = Vec::new();

    let lacking: Vec<&str> = diff
        .added
        .vhosts
        .iter()
        .filter_map(|vhost| field(vhost, "name"))
        .filter(|name| {
            !diff
                .added
                .permissions
                .iter()
                .any(|permission| field(permission, "vhost") == Some(*name))
        })
        .collect();
    if !lacking.is_empty() {
        warnings.push(format!(
            "There are added vhosts that lack permissions to later update those vhosts. \
             Make sure there are added permissions for every added vhost: {}",
            lacking.join(", ")
        ));
    }

    let changed: usize = RECREATED
        .iter()
        .map(|kind| diff.changed.get(*kind).len())
        .sum();
    if changed > 0 && !options.recreate_changed {
        warnings.push(format!(
            "Ignoring {changed} changed resources, which need to be deleted and recreated. \
             Provide --recreate-changed option to deploy changed resources."
        ));
    }

    let deleted: usize = diff.deleted.iter().map(|(_, records)| records.len()).sum();
    if deleted > 0 && options.no_deletions {
        warnings.push(format!(
            "Ignored {deleted} deleted resource(s). \
             Remove --no-deletions to remove deleted resources from server."
        ));
    }
    warnings
}

fn batch<'a>(
    operation: Operation,
    kind: Kind,
    recreate: bool,
    records: impl IntoIterator<Item = &'a Value>,
) -> Result<Batch> {
    let requests = records
        .into_iter()
        .map(|record| request_for(operation, kind, record))
        .collect::<Result<Vec<_>>>()?;
    Ok(Batch {
        operation,
        kind,
        recreate,
        requests,
    })
}

/// Whether the broker removes `record` on its own before its delete batch runs.
///
/// Deleting a vhost or user drops its permissions, and recreating a queue
/// or exchange drops its bindings.
fn removed_by_cascade(diff: &Diff, options: &DeployOptions, kind: Kind, record: &Value) -> bool {
    let deleted = |of: Kind, name: Option<&str>| {
        diff.deleted
            .get(of)
            .iter()
            .any(|r| field(r, "name").is_some() && field(r, "name") == name)
    };
    match kind {
        Kind::Binding => options.recreate_changed && diff.touches_changed_endpoint(record),
        Kind::Permission | Kind::TopicPermission => {
            deleted(Kind::Vhost, field(record, "vhost")) || deleted(Kind::User, field(record, "user"))
        }
        _ => false,
    }
}

/// Desired topic permissions to put back after the topic permission deletes.
///
/// The broker deletes topic permissions per vhost and user, across all
/// exchanges, so desired ones sharing a vhost and user with a deleted one
/// go with it.
fn restore_topic_permissions(
    diff: &Diff,
    desired: &Value,
    options: &DeployOptions,
    ignore: Option<&Index>,
) -> Result<Batch> {
    let kind = Kind::TopicPermission;
    let cleared: HashSet<(&str, &str)> = if options.no_deletions {
        HashSet::new()
    } else {
        diff.deleted
            .get(kind)
            .iter()
            .filter(|record| !removed_by_cascade(diff, options, kind, record))
            .filter_map(|record| Some((field(record, "vhost")?, field(record, "user")?)))
            .collect()
    };
    let records = desired
        .get(kind.plural())
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|record| !ignore.is_some_and(|ignore| ignore.ignores(kind, record)))
        .filter(|record| match (field(record, "vhost"), field(record, "user")) {
            (Some(vhost), Some(user)) => cleared.contains(&(vhost, user)),
            _ => false,
        });
    batch(Operation::Add, kind, true, records)
}

/// Turn a diff into ordered batches. Empty batches are left out.
pub fn plan(diff: &Diff, options: &DeployOptions) -> Result<Vec<Batch>> {
    let mut batches = Vec::new();

    for kind in MUTABLE {
        let changed = diff.changed.get(kind).iter().map(|change| &change.after);
        batches.push(batch(Operation::Update, kind, false, changed)?);
    }
    if options.recreate_changed {
        for kind in RECREATED {
            let changed = diff.changed.get(kind).iter().map(|change| &change.before);
            batches.push(batch(Operation::Delete, kind, true, changed)?);
        }
    }
    for kind in CREATE_ORDER {
        batches.push(batch(Operation::Add, kind, false, diff.added.get(kind))?);
    }
    if options.recreate_changed {
        for kind in RECREATED {
            let mut records: Vec<&Value> = diff.changed.get(kind).iter().map(|change| &change.after).collect();
            if kind == Kind::Binding {
                records.extend(&diff.implicitly_affected.bindings);
            }
            batches.push(batch(Operation::Add, kind, true, records)?);
        }
    }
    if !options.no_deletions {
        for kind in DELETE_ORDER {
            let deleted = diff
                .deleted
                .get(kind)
                .iter()
                .filter(|record| !removed_by_cascade(diff, options, kind, record));
            let mut delete = batch(Operation::Delete, kind, false, deleted)?;
            let mut seen = HashSet::new();
            delete.requests.retain(|request| seen.insert(request.path.clone()));
            batches.push(delete);
        }
    }

    batches.retain(|batch| !batch.requests.is_empty());
    Ok(batches)
}

/// Deploy `desired` to the broker behind `client`.
///
/// Options are checked before any request is made. On the first failed
/// batch, the first failure of that batch is returned and no further batch
/// starts.
pub fn deploy(
    client: &ManagementClient,
    desired: &Value,
    options: &DeployOptions,
    ignore: Option<&Index>,
) -> Result<DeployReport> {
    options.validate()?;
    if options.dry_run {
        log::warn!("Dry run is enabled. No changes will be applied.");
    }
    let client = client.clone().with_dry_run(options.dry_run || client.is_dry_run());

    let diff = diff_server(&client, desired, ignore)?;
    let warnings = warnings(&diff, options);
    for warning in &warnings {
        log::warn!("{warning}");
    }
    let mut batches = plan(&diff, options)?;
    let restore = restore_topic_permissions(&diff, desired, options, ignore)?;
    if !restore.requests.is_empty() {
        batches.push(restore);
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.jobs)
        .build()
        .map_err(|e| Error::InvalidOptions(format!("failed to create thread pool: {e}")))?;

    let mut report = DeployReport {
        dry_run: client.is_dry_run(),
        warnings,
        ..DeployReport::default()
    };
    for batch in batches {
        let results = execute_batch(&client, &pool, &batch.requests);
        let failed = results.iter().filter(|result| result.is_err()).count();
        let outcome = BatchOutcome {
            operation: batch.operation,
            kind: batch.kind,
            recreate: batch.recreate,
            succeeded: results.len() - failed,
            failed,
        };
        if failed == 0 {
            log::info!("{outcome}");
        } else {
            log::error!("{outcome}");
        }
        report.requests.extend(batch.requests);
        report.batches.push(outcome);

        if let Some(err) = results.into_iter().find_map(Result::err) {
            return Err(err);
        }
    }
    Ok(report)
}

/// Deploy to a broker URL carrying its credentials in the userinfo.
pub fn deploy_to_url(
    url: &str,
    desired: &Value,
    options: &DeployOptions,
    ignore: Option<&Index>,
) -> Result<DeployReport> {
    options.validate()?;
    let client = ManagementClient::from_url(url)?;
    deploy(&client, desired, options, ignore)
}

/// Send every request of a batch and wait for all of them.
fn execute_batch(
    client: &ManagementClient,
    pool: &rayon::ThreadPool,
    requests: &[PlannedRequest],
) -> Vec<Result<Value>> {
    let send = |request: &PlannedRequest| {
        let result = client.request(request.method, &request.path, request.body.as_ref());
        if let Err(err) = &result {
            log::debug!("{request} failed: {err}");
        }
        result
    };
    if requests.len() == 1 {
        requests.iter().map(send).collect()
    } else {
        pool.install(|| requests.par_iter().map(send).collect())
    }
}
