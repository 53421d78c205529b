//! `mft fetch` command - download the ERP data into a local snapshot

use chrono::Utc;
use console::style;
use miette::Result;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::warn;

use crate::cli::helpers;
use crate::cli::GlobalOpts;
use crate::core::client::{ApiClient, ApiError};
use crate::core::snapshot::{Manifest, Snapshot};
use crate::core::stage::Stage;

#[derive(clap::Args, Debug)]
pub struct FetchArgs {
    /// Snapshot directory (default: .mft/data)
    #[arg(long, value_name = "DIR")]
    pub out: Option<PathBuf>,

    /// Skip the production schedule
    #[arg(long)]
    pub no_schedule: bool,

    /// Continue with the remaining resources when one fails
    #[arg(long)]
    pub keep_going: bool,
}

pub fn run(args: FetchArgs, global: &GlobalOpts) -> Result<()> {
    let target = match &args.out {
        Some(dir) => dir.clone(),
        None => helpers::project(global)?.data_dir(),
    };
    let client = helpers::client(global)?;

    if !global.quiet {
        println!(
            "{} Fetching from {}",
            style("→").blue(),
            style(client.base_url()).cyan()
        );
    }

    let mut resources = vec![Resource::Batches];
    resources.extend(Stage::ALL.into_iter().map(Resource::Stage));
    if !args.no_schedule {
        resources.push(Resource::Schedule);
    }

    let staged = Snapshot::stage(&target)?;
    let outcome = match download(&staged, &client, &resources, &args, global) {
        Ok(outcome) => outcome,
        Err(e) => {
            staged.discard();
            return Err(e);
        }
    };

    if outcome.counts.is_empty() {
        staged.discard();
        return Err(failure_report(&outcome.failed, "The previous snapshot was kept"));
    }

    let manifest = Manifest {
        fetched_at: Utc::now(),
        api_url: client.base_url().to_string(),
        counts: outcome.counts,
        failed: outcome.failed.iter().map(|f| f.stem.clone()).collect(),
    };
    if let Err(e) = staged.write_manifest(&manifest) {
        staged.discard();
        return Err(e.into());
    }
    let snapshot = staged.commit(&target)?;

    if outcome.failed.is_empty() {
        if !global.quiet {
            println!();
            println!(
                "{} Snapshot written to {}",
                style("✓").green(),
                style(snapshot.dir().display()).cyan()
            );
        }
        Ok(())
    } else {
        Err(failure_report(
            &outcome.failed,
            "The new snapshot has no data for these resources",
        ))
    }
}

/// A resource that could not be downloaded
struct Failure {
    stem: String,
    transient: bool,
}

#[derive(Default)]
struct Outcome {
    counts: BTreeMap<String, usize>,
    failed: Vec<Failure>,
}

/// Download every resource into the staged snapshot
///
/// Stops at the first failure unless `--keep-going` is set.
fn download(
    staged: &Snapshot,
    client: &ApiClient,
    resources: &[Resource],
    args: &FetchArgs,
    global: &GlobalOpts,
) -> Result<Outcome> {
    let mut outcome = Outcome::default();
    for resource in resources {
        let stem = resource.stem();
        match resource.fetch(client) {
            Ok(records) => {
                staged.write_list(&stem, &records)?;
                if !global.quiet {
                    println!("  {:<20} {}", style(&stem).cyan(), records.len());
                }
                outcome.counts.insert(stem, records.len());
            }
            Err(e) if args.keep_going && !aborts_fetch(&e) => {
                let transient = e.is_transient();
                warn!(resource = %stem, transient, error = %e, "fetch failed, continuing");
                if !global.quiet {
                    println!("  {:<20} {}", style(&stem).cyan(), style("failed").red());
                }
                outcome.failed.push(Failure { stem, transient });
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(outcome)
}

fn failure_report(failed: &[Failure], kept: &str) -> miette::Report {
    let stems: Vec<&str> = failed.iter().map(|f| f.stem.as_str()).collect();
    let advice = if failed.iter().all(|f| f.transient) {
        "rerun `mft fetch` to retry"
    } else {
        "check api_url and the endpoints; the server refused some requests"
    };
    miette::miette!(
        help = format!("{}; {}", kept, advice),
        "Failed to fetch: {}",
        stems.join(", ")
    )
}

/// One downloadable resource and its snapshot file stem
#[derive(Debug, Clone, Copy)]
enum Resource {
    Batches,
    Stage(Stage),
    Schedule,
}

impl Resource {
    fn stem(&self) -> String {
        match *self {
            Resource::Batches => "batches".to_string(),
            Resource::Stage(stage) => stage.as_str().to_string(),
            Resource::Schedule => "schedule".to_string(),
        }
    }

    fn fetch(&self, client: &ApiClient) -> Result<Vec<Value>, ApiError> {
        match *self {
            Resource::Batches => client.fetch_batches(&[]),
            Resource::Stage(stage) => client.fetch_stage_records(stage, &[]),
            Resource::Schedule => client.fetch_schedule(&[]),
        }
    }
}

/// Failures that would repeat for every remaining resource
fn aborts_fetch(err: &ApiError) -> bool {
    matches!(
        err,
        ApiError::Session(_) | ApiError::Unauthorized { .. } | ApiError::Config(_)
    )
}
