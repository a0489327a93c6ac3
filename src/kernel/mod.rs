//! Kernel: the application context and job-queue infrastructure that the
//! HTTP surface and the dispatcher both depend on.

pub mod context;
pub mod jobs;

pub use context::AppContext;
