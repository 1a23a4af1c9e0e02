pub mod config;
pub mod file_formats;
pub mod graph;
pub mod scheduler;
pub mod sim;
pub mod skeleton;
pub mod snapshot;
pub mod utils;

pub use config::SimConfig;
pub use graph::{ConstraintGraph, GraphError};
pub use scheduler::{InstanceId, Scheduler, SchedulerCommand, SimInstance, SimState, TuningUpdate};
pub use sim::StepError;
pub use skeleton::{Bone, Skeleton, TRS};
pub use snapshot::{PoseSnapshot, SnapshotHandoff};
