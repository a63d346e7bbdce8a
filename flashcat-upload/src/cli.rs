///
/// This module implements the CLI interface for flashcat-upload: command parsing,
/// wiring of the real collaborators, and the user-visible summary.
///
/// All business logic (configuration resolution, repository detection, upload
/// orchestration) lives in the [`flashcat-upload-core`] crate.
///
/// ## How To Use
/// - For command-line users: use the installed `flashcat-upload` binary with `--help`.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// [`flashcat-upload-core`]: ../../flashcat-upload-core/
use crate::load_config::{load_config, CliOverrides, EnvironmentInputs};
use crate::upload::HttpUploader;
use anyhow::Result;
use clap::{Parser, Subcommand};
use flashcat_upload_core::artifact::FileArtifacts;
use flashcat_upload_core::repository::GitRepositoryDetector;
use flashcat_upload_core::upload_task::run_upload_task;
use flashcat_upload_core::FlashcatSite;
use std::path::PathBuf;

/// CLI for flashcat-upload: send mapping and symbol files to Flashcat.
#[derive(Parser)]
#[clap(
    name = "flashcat-upload",
    version,
    about = "Upload mapping and symbol files produced by a build to Flashcat"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload the files described by the given task file
    Upload {
        /// Path to the YAML task file
        #[clap(long)]
        config: PathBuf,
        /// API key; takes precedence over every other source
        #[clap(long)]
        api_key: Option<String>,
        /// Send request bodies uncompressed
        #[clap(long)]
        disable_gzip: bool,
        /// Build requests without sending them
        #[clap(long, hide = true)]
        emulate_network_call: bool,
    },
    /// List the sites files can be uploaded to
    Sites,
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Upload {
            config,
            api_key,
            disable_gzip,
            emulate_network_call,
        } => {
            let loaded = load_config(&config)?;
            let overrides = CliOverrides {
                api_key,
                disable_gzip,
                emulate_network_call,
            };
            let task_config = loaded.to_task_config(&overrides, &EnvironmentInputs::from_process())?;
            let artifacts = FileArtifacts::new(loaded.artifacts());
            let detector = GitRepositoryDetector::default();
            let uploader = HttpUploader::new().map_err(|e| anyhow::anyhow!(e))?;

            tracing::info!(command = "upload", "Starting upload");
            match run_upload_task(&task_config, &artifacts, &detector, &uploader).await {
                Ok(report) => {
                    tracing::info!(command = "upload", ?report, "Upload complete");
                    println!(
                        "Uploaded {} file(s) to {}.",
                        report.uploaded.len(),
                        report.site
                    );
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "upload", error = %e, "Upload failed");
                    Err(anyhow::Error::new(e))
                }
            }
        }
        Commands::Sites => {
            for site in FlashcatSite::ALL {
                println!(
                    "{}\t{}\t{}",
                    site.name(),
                    site.intake_host_name(),
                    site.upload_endpoint()
                );
            }
            Ok(())
        }
    }
}
