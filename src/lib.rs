pub mod checkpoint;
pub mod context;
pub mod error;
pub mod exec;
pub mod pipeline;
pub mod preflight;
pub mod stages;
pub mod tools;
pub mod validate;

pub use context::RunContext;
pub use error::PipelineError;
pub use pipeline::PipelineDriver;
pub use preflight::Toolchain;
