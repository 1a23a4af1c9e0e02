use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Per-instance simulation settings. Fixed at bind time, individual fields
/// adjustable between ticks through [`crate::scheduler::TuningUpdate`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SimConfig {
    /// Substeps per scheduler tick.
    pub substeps: u32,
    /// Solver iterations per substep.
    pub iterations: u32,
    pub gravity: Vec3,
    /// Verlet velocity damping in [0, 1); 0 = none.
    pub damping: f32,
    /// Global multiplier applied on top of per-constraint compliance.
    pub stiffness_scale: f32,
    /// Any solved position whose magnitude exceeds this fails the tick.
    pub divergence_bound: f32,
    /// Consecutive diverged ticks before the instance faults.
    pub fault_retry_budget: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            substeps: 4,
            iterations: 6,
            gravity: Vec3::new(0.0, -9.81, 0.0),
            damping: 0.01,
            stiffness_scale: 1.0,
            divergence_bound: 1.0e4,
            fault_retry_budget: 3,
        }
    }
}
