use crossbeam::channel::{Receiver, Sender};

use super::instance::SimInstance;
use super::InstanceId;

/// Instances move to a worker for the duration of one tick and come back
/// with the response, so each instance is only ever stepped by one thread
/// at a time while independent instances run in parallel.
pub enum Task {
    Step {
        instance: InstanceId,
        sim: Box<SimInstance>,
        dt: f32,
    },
}

pub enum Response {
    Stepped {
        instance: InstanceId,
        sim: Box<SimInstance>,
    },
}

fn worker_loop(rx: Receiver<Task>, tx: Sender<Response>) {
    while let Ok(task) = rx.recv() {
        match task {
            Task::Step { instance, mut sim, dt } => {
                sim.step_tick(dt);
                if tx.send(Response::Stepped { instance, sim }).is_err() {
                    return;
                }
            }
        }
    }
}

pub struct WorkerPool {
    workers: Vec<std::thread::JoinHandle<()>>,
    task_tx: Sender<Task>,
    response_rx: Receiver<Response>,
}

impl WorkerPool {
    pub fn init(worker_count: usize) -> Self {
        let (task_tx, task_rx) = crossbeam::channel::unbounded::<Task>();
        let (response_tx, response_rx) = crossbeam::channel::unbounded::<Response>();

        let workers = (0..worker_count.max(1))
            .map(|_| {
                let rx = task_rx.clone();
                let tx = response_tx.clone();
                std::thread::spawn(move || worker_loop(rx, tx))
            })
            .collect();

        Self {
            workers,
            task_tx,
            response_rx,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn submit(&self, task: Task) {
        // workers only exit once the pool (and this sender) is gone
        let _ = self.task_tx.send(task);
    }

    pub fn recv(&self) -> Option<Response> {
        self.response_rx.recv().ok()
    }
}
