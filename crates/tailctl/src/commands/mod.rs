//! Command handlers: bridge CLI args -> dispatcher invocations -> output.

pub mod config_cmd;
pub mod invoke;
pub mod tools;
