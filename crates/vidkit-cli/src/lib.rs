use anyhow::Context;
use std::sync::Arc;

use vidkit_client::{HttpMediaService, InMemoryMediaService, MediaService};
use vidkit_core::Config;
use vidkit_processing::WorkflowEvent;

/// Initialize tracing for the CLI. Logs go to stderr; stdout carries JSON results.
pub fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// The HTTP client for the configured account, or the in-memory simulation.
pub fn build_service(config: &Config, simulate: bool) -> anyhow::Result<Arc<dyn MediaService>> {
    if simulate {
        tracing::info!("Using simulated media service");
        return Ok(Arc::new(InMemoryMediaService::new()));
    }
    let credentials = config
        .require_credentials()
        .context("Set VIDKIT_ACCOUNT_NAME and VIDKIT_ACCOUNT_KEY, or pass --simulate")?
        .clone();
    let service = HttpMediaService::new(
        &config.api_url,
        credentials,
        config.http_timeout,
        config.upload_block_size_bytes,
    )
    .context("Failed to create media service client")?;
    Ok(Arc::new(service))
}

/// Fails for commands that look up assets from an earlier invocation when
/// the simulated service is selected; each process starts with an empty one.
pub fn ensure_persistent_service(command: &str, simulate: bool) -> anyhow::Result<()> {
    if simulate {
        anyhow::bail!(
            "`{}` needs assets from an earlier run, but --simulate starts empty every time; \
             use `vidkit --simulate run` instead",
            command
        );
    }
    Ok(())
}

/// One-line, human readable rendering of a workflow event for stderr.
pub fn describe_event(event: &WorkflowEvent) -> String {
    match event {
        WorkflowEvent::ReservedUnits { unit_type, units } if *units < 0 => {
            format!("Reserved units ({}): unknown", unit_type)
        }
        WorkflowEvent::ReservedUnits { unit_type, units } => {
            format!("Reserved units ({}): {}", unit_type, units)
        }
        WorkflowEvent::ReservedUnitsUpdated(setting) => format!(
            "Reserved units ({}) set to {}",
            setting.unit_type, setting.current_units
        ),
        WorkflowEvent::StreamingEndpoints { endpoints } => endpoints
            .iter()
            .map(|e| {
                format!(
                    "Streaming endpoint {}: {} scale units, {}",
                    e.name, e.scale_units, e.state
                )
            })
            .collect::<Vec<_>>()
            .join("\n"),
        WorkflowEvent::AssetCreated { asset_id, name } => {
            format!("Created asset '{}' ({})", name, asset_id)
        }
        WorkflowEvent::UploadProgress { percent } => format!("Upload: {:.2}%", percent),
        WorkflowEvent::Uploaded(file) => format!(
            "Uploaded {} ({} bytes)",
            file.file.name, file.bytes_transferred
        ),
        WorkflowEvent::JobSubmitted {
            job_id,
            output_asset_id,
        } => format!("Submitted job {} (output asset {})", job_id, output_asset_id),
        WorkflowEvent::JobProgress(p) => format!("Job {}: {:.2}%", p.state, p.progress),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidkit_core::models::{JobState, ReservedUnitType};
    use vidkit_processing::JobProgress;

    #[test]
    fn unknown_units_are_not_printed_as_a_count() {
        let event = WorkflowEvent::ReservedUnits {
            unit_type: ReservedUnitType::Basic,
            units: -1,
        };
        assert_eq!(describe_event(&event), "Reserved units (basic): unknown");
    }

    #[test]
    fn job_progress_has_two_decimals() {
        let event = WorkflowEvent::JobProgress(JobProgress {
            job_id: "j".to_string(),
            state: JobState::Processing,
            progress: 12.5,
        });
        assert_eq!(describe_event(&event), "Job processing: 12.50%");
    }

    #[test]
    fn lookups_by_id_reject_the_simulated_service() {
        let err = ensure_persistent_service("encode", true).unwrap_err();
        assert!(err.to_string().contains("--simulate"));
        assert!(ensure_persistent_service("locator", false).is_ok());
    }

    #[test]
    fn http_service_needs_credentials() {
        let config = Config::default();
        assert!(build_service(&config, false).is_err());
        assert!(build_service(&config, true).is_ok());
    }
}
