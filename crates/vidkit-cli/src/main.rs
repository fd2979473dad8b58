//! vidkit: upload a video, encode it, and mint a streaming URL.
//!
//! Set VIDKIT_ACCOUNT_NAME and VIDKIT_ACCOUNT_KEY (and VIDKIT_API_URL), or pass
//! --simulate to run against the in-memory service. The simulation keeps no
//! state between processes, so `encode` and `locator` refuse it.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use vidkit_cli::{build_service, describe_event, ensure_persistent_service, init_tracing};
use vidkit_core::models::{AssetCreationOptions, ReservedUnitType};
use vidkit_core::Config;
use vidkit_processing::{
    asset_name_for, EncodeWorkflow, StreamingFormat, WorkflowEvent, WorkflowRequest,
};

#[derive(Parser)]
#[command(name = "vidkit", about = "Video upload, encoding and streaming CLI")]
struct Cli {
    /// Run against the in-memory simulated service
    #[arg(long, global = true)]
    simulate: bool,
    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload, encode and publish a file in one go
    Run {
        /// Path to the video file
        file: PathBuf,
        /// Asset name (defaults to the file name without extension)
        #[arg(long)]
        asset_name: Option<String>,
        /// Encoding profile (defaults to VIDKIT_ENCODING_PROFILE)
        #[arg(long)]
        profile: Option<String>,
        /// Streaming format: hls, dash, smooth, or a (format=...) qualifier
        #[arg(long, default_value = "hls")]
        format: StreamingFormat,
        /// Encrypt the asset at rest
        #[arg(long)]
        encrypt: bool,
        /// Reserved unit tier to report (and to set with --units)
        #[arg(long, default_value = "basic")]
        units_type: ReservedUnitType,
        /// Reserved unit count to apply before uploading
        #[arg(long)]
        units: Option<i64>,
    },
    /// Upload a file into a new asset
    Upload {
        /// Path to the video file
        file: PathBuf,
        /// Asset name (defaults to the file name without extension)
        #[arg(long)]
        asset_name: Option<String>,
    },
    /// Encode an existing asset and wait for the job
    Encode {
        /// Input asset ID
        asset_id: String,
        #[arg(long)]
        profile: Option<String>,
    },
    /// Create a streaming locator for an encoded asset
    Locator {
        /// Asset ID holding the manifest
        asset_id: String,
        #[arg(long, default_value = "hls")]
        format: StreamingFormat,
    },
    /// Reserved encoding units
    Units {
        #[command(subcommand)]
        sub: UnitsCommands,
    },
    /// List streaming endpoints
    Endpoints,
    /// List media processors
    Processors,
}

#[derive(Subcommand)]
enum UnitsCommands {
    /// Show current units for a tier (-1 when unknown)
    Get {
        /// basic, standard or premium
        unit_type: ReservedUnitType,
    },
    /// Set the units for a tier
    Set {
        unit_type: ReservedUnitType,
        #[arg(allow_negative_numbers = true)]
        count: i64,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", out);
    Ok(())
}

fn print_event(event: WorkflowEvent) {
    eprintln!("{}", describe_event(&event));
}

/// First Ctrl-C stops waiting on the job; a second one exits.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        eprintln!("Interrupted; stopping the wait (the remote job keeps running)");
        token.cancel();
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
    cancel
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = Config::from_env().context("Invalid VIDKIT_* configuration")?;
    let service = build_service(&config, cli.simulate)?;
    let workflow = EncodeWorkflow::new(service.clone(), &config);

    match cli.command {
        Commands::Run {
            file,
            asset_name,
            profile,
            format,
            encrypt,
            units_type,
            units,
        } => {
            let mut request = WorkflowRequest::new(
                &file,
                profile.unwrap_or_else(|| config.encoding_profile.clone()),
            );
            if let Some(name) = asset_name {
                request.asset_name = name;
            }
            if encrypt {
                request.asset_options = AssetCreationOptions::StorageEncrypted;
            }
            request.format = format;
            request.report_units_type = units_type;
            request.reserved_units = units.map(|n| (units_type, n));

            let cancel = cancel_on_ctrl_c();
            let report = workflow.run(&request, &cancel, &print_event).await?;
            print_json(&report)?;
        }
        Commands::Upload { file, asset_name } => {
            let name = asset_name.unwrap_or_else(|| asset_name_for(&file));
            let asset = service
                .create_asset(&name, AssetCreationOptions::None)
                .await
                .context("Failed to create asset")?;
            let uploaded = workflow
                .uploads()
                .upload(&file, &asset, |percent| {
                    print_event(WorkflowEvent::UploadProgress { percent })
                })
                .await?;
            print_json(&uploaded)?;
        }
        Commands::Encode { asset_id, profile } => {
            ensure_persistent_service("encode", cli.simulate)?;
            let asset = service
                .get_asset(&asset_id)
                .await
                .with_context(|| format!("Failed to load asset {}", asset_id))?;
            let profile = profile.unwrap_or_else(|| config.encoding_profile.clone());
            let handle = workflow.jobs().submit_encoding_job(&asset, &profile).await?;
            eprintln!("Submitted job {}", handle.job_id());

            let cancel = cancel_on_ctrl_c();
            let completed = workflow
                .jobs()
                .await_completion(&handle, &cancel, |progress| {
                    print_event(WorkflowEvent::JobProgress(progress.clone()))
                })
                .await?;
            print_json(&serde_json::json!({ "job": handle, "completed": completed }))?;
        }
        Commands::Locator { asset_id, format } => {
            ensure_persistent_service("locator", cli.simulate)?;
            let streaming = workflow
                .locators()
                .resolve_for_asset_id(&asset_id, &format)
                .await?;
            print_json(&streaming)?;
        }
        Commands::Units { sub } => match sub {
            UnitsCommands::Get { unit_type } => {
                let units = workflow.quotas().get_reserved_units(unit_type).await;
                print_json(&serde_json::json!({ "unit_type": unit_type, "units": units }))?;
            }
            UnitsCommands::Set { unit_type, count } => {
                let setting = workflow
                    .quotas()
                    .set_reserved_units(unit_type, count)
                    .await?;
                print_json(&setting)?;
            }
        },
        Commands::Endpoints => {
            let endpoints = workflow.quotas().list_streaming_endpoints().await?;
            print_json(&endpoints)?;
        }
        Commands::Processors => {
            let processors = workflow.jobs().list_processors().await?;
            print_json(&processors)?;
        }
    }

    Ok(())
}
