//! Post-execution reporting: task-log persistence and failure alerts.

pub mod alerts;
pub mod pipeline;

pub use alerts::{Alert, AlertPool};
pub use pipeline::{ResultPipeline, END_TIME_FORMAT};
