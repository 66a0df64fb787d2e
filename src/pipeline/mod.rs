//! Compilation pipeline: dialect selection, stages and the executor.

pub mod dialect;
pub mod executor;
pub mod stage;

pub use dialect::{select_steps, Dialect, QUERY_BINDING};
pub use executor::Pipeline;
pub use stage::{IdentityStage, Stage, StageProgram};
