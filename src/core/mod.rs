pub mod container;
pub mod copier;
pub mod hasher;
pub mod models;
pub mod orchestrator;
pub mod report;
pub mod sizing;
pub mod system_info;
pub mod transfer_engine;

pub use container::{Container, ContainerError, ContainerManager, MountedContainer};
pub use copier::{CopyError, MetadataCopier};
pub use hasher::{HashAlgorithm, HashError};
pub use models::{ContainerState, CopyRecord, CopyStatus, HashLog, SelectionSet, SizeEstimate};
pub use orchestrator::{Orchestrator, RunError, RunSummary};
pub use report::{ReportPaths, VerificationReport, VerificationReporter};
pub use system_info::SystemInfo;
