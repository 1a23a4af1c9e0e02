use std::sync::Arc;

use crate::config::SimConfig;
use crate::graph::{ConstraintGraph, GraphError};
use crate::sim::blend::BlendState;
use crate::sim::solver::{self, SolverParams};
use crate::sim::{chain, StepError};
use crate::skeleton::{Skeleton, TRS};
use crate::snapshot::{PoseSnapshot, SnapshotHandoff};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimState {
    Idle,
    Stepping,
    /// Retry budget exhausted: the instance holds its last valid snapshot and
    /// stops advancing until [`SimInstance::reset`].
    Faulted,
}

/// Between-tick tuning command; applied atomically at the start of the next
/// tick, never mid-iteration.
#[derive(Clone, Copy, Debug)]
pub enum TuningUpdate {
    StiffnessScale(f32),
    SolverIterations(u32),
    Substeps(u32),
    BlendWeight { bone: u32, weight: f32 },
}

/// One simulated character: skeleton + bound graph + blend state, stepped as
/// a unit. Chain integration, constraint projection and blending run strictly
/// in that order on whichever worker holds the instance.
pub struct SimInstance {
    skeleton: Skeleton,
    graph: ConstraintGraph,
    blend: BlendState,
    config: SimConfig,
    state: SimState,
    diverged_streak: u32,
    /// Latest kinematic input, local space. Read-only during the step.
    kinematic: Vec<TRS>,
    kin_world: Vec<TRS>,
    physical: Vec<TRS>,
    blended: Vec<TRS>,
    handoff: Arc<SnapshotHandoff>,
    tick: u64,
    pending_tuning: Vec<TuningUpdate>,
}

impl SimInstance {
    pub fn new(
        skeleton: Skeleton,
        graph: ConstraintGraph,
        config: SimConfig,
    ) -> Result<Self, GraphError> {
        match graph.bound_bone_count() {
            None => return Err(GraphError::NotBound),
            Some(bound) if bound != skeleton.len() => {
                return Err(GraphError::SkeletonMismatch {
                    bound,
                    actual: skeleton.len(),
                })
            }
            Some(_) => {}
        }
        let n = skeleton.len();
        let blend = BlendState::from_defs(n, graph.blend_defs());
        let kinematic = skeleton.rest_locals();
        Ok(Self {
            skeleton,
            graph,
            blend,
            config,
            state: SimState::Idle,
            diverged_streak: 0,
            kinematic,
            kin_world: Vec::with_capacity(n),
            physical: Vec::with_capacity(n),
            blended: Vec::with_capacity(n),
            handoff: Arc::new(SnapshotHandoff::new(PoseSnapshot::init(n))),
            tick: 0,
            pending_tuning: Vec::new(),
        })
    }

    pub fn handoff(&self) -> Arc<SnapshotHandoff> {
        self.handoff.clone()
    }

    pub fn state(&self) -> SimState {
        self.state
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// New kinematic input for the next tick. The pose is never mutated by
    /// the simulation.
    pub fn set_kinematic_pose(&mut self, pose: Vec<TRS>) {
        if pose.len() == self.skeleton.len() {
            self.kinematic = pose;
        } else {
            log::warn!(
                target: "pose_control::scheduler",
                "kinematic pose with {} bones ignored, skeleton has {}",
                pose.len(),
                self.skeleton.len()
            );
        }
    }

    pub fn queue_tuning(&mut self, update: TuningUpdate) {
        self.pending_tuning.push(update);
    }

    /// Clear the fault and all accumulated particle motion, as on asset
    /// re-bind.
    pub fn reset(&mut self) {
        self.graph.reset_particles();
        self.diverged_streak = 0;
        if self.state == SimState::Faulted {
            log::info!(target: "pose_control::scheduler", "faulted instance reset");
        }
        self.state = SimState::Idle;
    }

    fn apply_tuning(&mut self) {
        for update in std::mem::take(&mut self.pending_tuning) {
            match update {
                TuningUpdate::StiffnessScale(s) => {
                    if s.is_finite() && s > 0.0 {
                        self.config.stiffness_scale = s;
                    } else {
                        log::warn!(
                            target: "pose_control::scheduler",
                            "ignoring out-of-domain stiffness scale {s}"
                        );
                    }
                }
                TuningUpdate::SolverIterations(n) => self.config.iterations = n.max(1),
                TuningUpdate::Substeps(n) => self.config.substeps = n.max(1),
                TuningUpdate::BlendWeight { bone, weight } => self.blend.set_target(bone, weight),
            }
        }
    }

    /// One full scheduler tick: apply queued tuning, integrate and solve all
    /// substeps, blend, publish. On divergence the tick falls back to the
    /// kinematic pose; enough consecutive failures fault the instance.
    pub fn step_tick(&mut self, dt: f32) {
        if self.state == SimState::Faulted {
            return;
        }
        self.state = SimState::Stepping;
        self.tick += 1;
        self.apply_tuning();
        self.blend.update(dt);
        self.skeleton.world_transforms(&self.kinematic, &mut self.kin_world);

        // physical pose starts from the authored targets each tick; particles
        // carry their momentum across ticks
        self.physical.clear();
        self.physical.extend_from_slice(&self.kin_world);

        let substeps = self.config.substeps.max(1);
        let sub_dt = dt / substeps as f32;
        let params = SolverParams::from_config(&self.config);

        let mut failure: Option<StepError> = None;
        for substep in 0..substeps {
            {
                let (_, particles, _) = self.graph.solve_parts();
                chain::integrate(particles, self.config.gravity, self.config.damping, sub_dt);
            }
            if let Err(err) =
                solver::project(&mut self.graph, &mut self.physical, &params, sub_dt, substep)
            {
                failure = Some(err);
                break;
            }
        }

        match failure {
            None => {
                self.diverged_streak = 0;
                self.blend.blend(&self.kin_world, &self.physical, &mut self.blended);
                self.handoff.publish(PoseSnapshot {
                    tick: self.tick,
                    bones: self.blended.clone(),
                });
                self.state = SimState::Idle;
            }
            Some(err) => {
                self.diverged_streak += 1;
                self.graph.reset_particles();
                if self.diverged_streak >= self.config.fault_retry_budget {
                    log::warn!(
                        target: "pose_control::scheduler",
                        "instance faulted after {} consecutive diverged ticks: {err}",
                        self.diverged_streak
                    );
                    // hold the last valid snapshot
                    self.state = SimState::Faulted;
                } else {
                    log::debug!(
                        target: "pose_control::scheduler",
                        "tick {} diverged, publishing kinematic fallback: {err}",
                        self.tick
                    );
                    self.handoff.publish(PoseSnapshot {
                        tick: self.tick,
                        bones: self.kin_world.clone(),
                    });
                    self.state = SimState::Idle;
                }
            }
        }
    }
}
