mod flood_failure;
mod flood_simulation;
mod recovery;
mod segmentation;

pub use flood_failure::FloodNetworkFailure;
pub use flood_simulation::FloodSimulation;
pub use recovery::{
    gcc_timeline, recovery_order, resiliency_score, NetworkRecovery, RecoveryMode, TimelineStep,
};
pub use segmentation::Segmentation;
