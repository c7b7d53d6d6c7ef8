pub mod config;
pub mod pidfile;
pub mod telemetry;
