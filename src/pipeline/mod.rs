//! Variant generation: sampling, command building, frame-level face swap and
//! the orchestrator that drives a job to a terminal state.

pub mod archive;
pub mod captions;
pub mod command;
pub mod error;
pub mod ffmpeg;
pub mod frames;
pub mod hashing;
pub mod orchestrator;
pub mod progress;
pub mod raster;
pub mod sampler;
pub mod state;
pub mod workdir;

pub use error::{ErrorClass, PipelineError, Policy};
pub use orchestrator::{JobOutcome, VariantOrchestrator};
