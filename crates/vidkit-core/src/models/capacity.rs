use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Encoding reserved unit tier (Basic = S1, Standard = S2, Premium = S3).
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ReservedUnitType {
    #[default]
    Basic,
    Standard,
    Premium,
}

impl ReservedUnitType {
    pub fn sku(&self) -> &'static str {
        match self {
            ReservedUnitType::Basic => "S1",
            ReservedUnitType::Standard => "S2",
            ReservedUnitType::Premium => "S3",
        }
    }
}

impl Display for ReservedUnitType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ReservedUnitType::Basic => write!(f, "basic"),
            ReservedUnitType::Standard => write!(f, "standard"),
            ReservedUnitType::Premium => write!(f, "premium"),
        }
    }
}

impl FromStr for ReservedUnitType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "basic" | "s1" => Ok(ReservedUnitType::Basic),
            "standard" | "s2" => Ok(ReservedUnitType::Standard),
            "premium" | "s3" => Ok(ReservedUnitType::Premium),
            _ => Err(anyhow::anyhow!(
                "Invalid reserved unit type: {}. Must be: basic, standard, or premium",
                s
            )),
        }
    }
}

/// Account-wide encoding quota, independent of any single job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReservedUnitSetting {
    pub unit_type: ReservedUnitType,
    pub current_units: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EndpointState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Deleting,
}

impl Display for EndpointState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            EndpointState::Stopped => write!(f, "stopped"),
            EndpointState::Starting => write!(f, "starting"),
            EndpointState::Running => write!(f, "running"),
            EndpointState::Stopping => write!(f, "stopping"),
            EndpointState::Deleting => write!(f, "deleting"),
        }
    }
}

/// Origin serving streaming locators, with its purchased scale units.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamingEndpoint {
    pub name: String,
    pub scale_units: u32,
    pub state: EndpointState,
}
