pub mod asset;
pub mod capacity;
pub mod job;
pub mod locator;
pub mod processor;

pub use asset::{Asset, AssetCreationOptions, AssetFile};
pub use capacity::{EndpointState, ReservedUnitSetting, ReservedUnitType, StreamingEndpoint};
pub use job::{Job, JobSnapshot, JobState, Task, TaskSpec};
pub use locator::{AccessPermission, AccessPolicy, Locator, LocatorKind};
pub use processor::{MediaProcessor, ProcessorVersion};
