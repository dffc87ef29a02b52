pub mod api;
pub mod bulk;
pub mod config;
pub mod control;
pub mod dashboard;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod redact;
pub mod repo;
pub mod telemetry;

pub use control::ControlPlane;
pub use error::{QueueError, Result};
