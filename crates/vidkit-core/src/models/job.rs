use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use super::asset::AssetCreationOptions;

/// Job lifecycle as reported by the media service. Transitions happen remotely;
/// this program only observes them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Scheduled,
    Processing,
    Finished,
    Error,
    Canceled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Finished | JobState::Error | JobState::Canceled
        )
    }
}

impl Display for JobState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            JobState::Queued => write!(f, "queued"),
            JobState::Scheduled => write!(f, "scheduled"),
            JobState::Processing => write!(f, "processing"),
            JobState::Finished => write!(f, "finished"),
            JobState::Error => write!(f, "error"),
            JobState::Canceled => write!(f, "canceled"),
        }
    }
}

impl FromStr for JobState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "queued" => Ok(JobState::Queued),
            "scheduled" => Ok(JobState::Scheduled),
            "processing" => Ok(JobState::Processing),
            "finished" => Ok(JobState::Finished),
            "error" => Ok(JobState::Error),
            "canceled" | "cancelled" => Ok(JobState::Canceled),
            _ => Err(anyhow::anyhow!("Invalid job state: {}", s)),
        }
    }
}

/// One observation of a job's state and overall progress (0-100).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSnapshot {
    pub job_id: String,
    pub state: JobState,
    pub progress: f64,
    /// Provider-reported failure text, present when `state` is `Error`.
    #[serde(default)]
    pub error_detail: Option<String>,
}

/// What a task should do; sent to the service when it is added to a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskSpec {
    pub name: String,
    pub processor_id: String,
    pub profile: String,
    pub input_asset_id: String,
    pub output_asset_name: String,
    #[serde(default)]
    pub output_options: AssetCreationOptions,
}

/// A task attached to a job. Immutable once the job is submitted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub job_id: String,
    pub name: String,
    pub processor_id: String,
    pub profile: String,
    pub input_asset_id: String,
    /// Created by the service together with the task, before submission.
    pub output_asset_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: String,
    pub name: String,
    pub state: JobState,
    pub progress: f64,
    #[serde(default)]
    pub tasks: Vec<Task>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Output asset ids in task order.
    pub fn output_asset_ids(&self) -> Vec<String> {
        self.tasks.iter().map(|t| t.output_asset_id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(JobState::Finished.is_terminal());
        assert!(JobState::Error.is_terminal());
        assert!(JobState::Canceled.is_terminal());
        assert!(!JobState::Queued.is_terminal());
        assert!(!JobState::Scheduled.is_terminal());
        assert!(!JobState::Processing.is_terminal());
    }

    #[test]
    fn state_parses_display_form_and_provider_spelling() {
        for state in [
            JobState::Queued,
            JobState::Scheduled,
            JobState::Processing,
            JobState::Finished,
            JobState::Error,
            JobState::Canceled,
        ] {
            assert_eq!(state.to_string().parse::<JobState>().unwrap(), state);
        }
        assert_eq!("Cancelled".parse::<JobState>().unwrap(), JobState::Canceled);
        assert!("running".parse::<JobState>().is_err());
    }
}
