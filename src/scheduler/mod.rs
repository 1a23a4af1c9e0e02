mod instance;
pub mod worker_pool;

pub use instance::{SimInstance, SimState, TuningUpdate};

use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use crossbeam_queue::SegQueue;
use generational_arena::{Arena, Index};

use crate::skeleton::TRS;
use crate::snapshot::SnapshotHandoff;
use worker_pool::{Response, Task, WorkerPool};

#[derive(Hash, Eq, PartialEq, Clone, Copy, Debug)]
pub struct InstanceId(pub Index);
impl From<InstanceId> for Index {
    fn from(id: InstanceId) -> Index {
        id.0
    }
}

pub enum SchedulerCommand {
    Add {
        sim: Box<SimInstance>,
        reply: crossbeam::channel::Sender<InstanceId>,
    },
    SetPose {
        instance: InstanceId,
        pose: Vec<TRS>,
    },
    Tune {
        instance: InstanceId,
        update: TuningUpdate,
    },
    Reset {
        instance: InstanceId,
    },
    /// Processed between ticks, so an in-flight step always finishes its
    /// substep loop before the instance is discarded.
    Remove {
        instance: InstanceId,
    },
    Exit,
}

/// Advances every registered instance at a fixed timestep. Instances are
/// handed to the worker pool for the duration of a tick (`None` in the slot
/// while in flight) and collected back before the tick ends, so commands
/// always run against settled state.
pub struct Scheduler {
    slots: Arena<Option<Box<SimInstance>>>,
    pool: WorkerPool,
    tick_dt: f32,
}

impl Scheduler {
    pub fn new(tick_dt: f32, workers: usize) -> Self {
        Self {
            slots: Arena::new(),
            pool: WorkerPool::init(workers),
            tick_dt,
        }
    }

    pub fn tick_dt(&self) -> f32 {
        self.tick_dt
    }

    pub fn instance_count(&self) -> usize {
        self.slots.len()
    }

    pub fn add_instance(&mut self, sim: Box<SimInstance>) -> InstanceId {
        let id = InstanceId(self.slots.insert(Some(sim)));
        log::info!(target: "pose_control::scheduler", "instance {:?} added", id.0);
        id
    }

    pub fn instance(&self, id: InstanceId) -> Option<&SimInstance> {
        self.slots.get(id.into()).and_then(|s| s.as_deref())
    }

    pub fn handoff(&self, id: InstanceId) -> Option<Arc<SnapshotHandoff>> {
        self.instance(id).map(|sim| sim.handoff())
    }

    pub fn state(&self, id: InstanceId) -> Option<SimState> {
        self.instance(id).map(|sim| sim.state())
    }

    /// Returns false once `Exit` is seen.
    pub fn apply_command(&mut self, cmd: SchedulerCommand) -> bool {
        match cmd {
            SchedulerCommand::Add { sim, reply } => {
                let id = self.add_instance(sim);
                let _ = reply.send(id);
            }
            SchedulerCommand::SetPose { instance, pose } => {
                if let Some(Some(sim)) = self.slots.get_mut(instance.into()) {
                    sim.set_kinematic_pose(pose);
                }
            }
            SchedulerCommand::Tune { instance, update } => {
                if let Some(Some(sim)) = self.slots.get_mut(instance.into()) {
                    sim.queue_tuning(update);
                }
            }
            SchedulerCommand::Reset { instance } => {
                if let Some(Some(sim)) = self.slots.get_mut(instance.into()) {
                    sim.reset();
                }
            }
            SchedulerCommand::Remove { instance } => {
                if self.slots.remove(instance.into()).is_some() {
                    log::info!(target: "pose_control::scheduler", "instance {:?} removed", instance.0);
                }
            }
            SchedulerCommand::Exit => return false,
        }
        true
    }

    /// Step every instance once. Independent instances run in parallel on
    /// the pool; within one instance the chain -> solver -> blend order is
    /// fixed and single-threaded.
    pub fn tick(&mut self) {
        let mut in_flight = 0usize;
        for (idx, slot) in self.slots.iter_mut() {
            if let Some(sim) = slot.take() {
                self.pool.submit(Task::Step {
                    instance: InstanceId(idx),
                    sim,
                    dt: self.tick_dt,
                });
                in_flight += 1;
            }
        }
        while in_flight > 0 {
            match self.pool.recv() {
                Some(Response::Stepped { instance, sim }) => {
                    in_flight -= 1;
                    if let Some(slot) = self.slots.get_mut(instance.into()) {
                        *slot = Some(sim);
                    }
                    // a missing slot means the instance was torn down; the
                    // finished step is discarded with the box
                }
                None => break,
            }
        }
    }
}

const SPIN: Duration = Duration::from_micros(200);

/// Fixed-cadence scheduler thread. Commands are drained between ticks; the
/// pacing sleeps most of the remaining tick and spins the last bit, and
/// resyncs the schedule if a tick ran long.
pub fn spawn_scheduler(
    commands: Arc<SegQueue<SchedulerCommand>>,
    mut scheduler: Scheduler,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let tick = Duration::from_secs_f32(scheduler.tick_dt());
        let mut next = Instant::now() + tick;
        loop {
            while let Some(cmd) = commands.pop() {
                if !scheduler.apply_command(cmd) {
                    return;
                }
            }

            scheduler.tick();

            next += tick;
            if let Some(remain) = next.checked_duration_since(Instant::now()) {
                if remain > SPIN {
                    thread::sleep(remain - SPIN);
                }
                while Instant::now() < next {
                    std::hint::spin_loop();
                }
            } else {
                // if we fell behind, resync the schedule
                next = Instant::now() + tick;
            }
        }
    })
}
