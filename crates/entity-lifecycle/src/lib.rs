pub mod config;
pub mod console;
pub mod error;
pub mod lifecycle;
pub mod segments;
pub mod telemetry;
