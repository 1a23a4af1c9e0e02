pub mod blend;
pub mod chain;
pub mod solver;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StepError {
    /// A solved position went non-finite or past the sanity bound. The tick's
    /// results must be discarded; the caller falls back to the kinematic pose.
    #[error("solver diverged at substep {substep}: {detail}")]
    Diverged { substep: u32, detail: &'static str },
}
