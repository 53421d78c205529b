//! `mft init` command - Initialize a new mft project

use console::style;
use miette::{IntoDiagnostic, Result};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use crate::core::project::{Project, ProjectError};

#[derive(clap::Args, Debug)]
pub struct InitArgs {
    /// Directory to initialize (default: current directory)
    #[arg(default_value = ".")]
    pub path: std::path::PathBuf,

    /// Base URL of the ERP REST API, written to the project config
    #[arg(long, value_name = "URL")]
    pub api_url: Option<String>,

    /// Force initialization even if .mft/ already exists
    #[arg(long)]
    pub force: bool,
}

pub fn run(args: InitArgs) -> Result<()> {
    let path = if args.path.as_os_str() == "." {
        std::env::current_dir().into_diagnostic()?
    } else {
        args.path.clone()
    };

    if !path.exists() {
        std::fs::create_dir_all(&path).into_diagnostic()?;
        println!(
            "{} Created directory {}",
            style("✓").green(),
            style(path.display()).cyan()
        );
    }

    let project = if args.force {
        Project::init_force(&path)
    } else {
        Project::init(&path)
    };

    match project {
        Ok(project) => {
            if let Some(url) = &args.api_url {
                append_api_url(&project, url)?;
            }

            println!(
                "{} Initialized mft project at {}",
                style("✓").green(),
                style(project.root().display()).cyan()
            );
            println!();
            println!("Created project structure:");
            print_structure(project.root());
            println!();
            println!("Next steps:");
            if args.api_url.is_none() {
                println!(
                    "  {} Point mft at the ERP",
                    style("mft config set api_url <URL>").yellow()
                );
            }
            println!(
                "  {} Store an access token",
                style("mft session set <TOKEN>").yellow()
            );
            println!(
                "  {} Download a snapshot",
                style("mft fetch").yellow()
            );
            println!(
                "  {} Show batch progress",
                style("mft trace list").yellow()
            );
            Ok(())
        }
        Err(ProjectError::AlreadyExists(path)) => {
            println!(
                "{} mft project already exists at {}",
                style("!").yellow(),
                style(path.display()).cyan()
            );
            println!();
            println!(
                "Use {} to reinitialize",
                style("mft init --force").yellow()
            );
            Ok(())
        }
        Err(e) => Err(miette::miette!("{}", e)),
    }
}

fn append_api_url(project: &Project, url: &str) -> Result<()> {
    let entry = BTreeMap::from([("api_url", url.trim())]);
    let yaml = serde_yml::to_string(&entry).into_diagnostic()?;
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(project.config_path())
        .into_diagnostic()?;
    write!(file, "\n{}", yaml).into_diagnostic()?;
    Ok(())
}

fn print_structure(root: &Path) {
    let entries = [
        ".mft/",
        ".mft/config.yaml",
        ".mft/data/",
        ".mft/forms/",
    ];

    for entry in entries {
        let path = root.join(entry);
        if path.exists() {
            println!("  {}", style(entry).dim());
        }
    }
}
