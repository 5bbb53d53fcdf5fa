pub mod commands;
pub mod config;
pub mod context;
pub mod deployment;
pub mod document;
pub mod kubectl;
pub mod names;
pub mod release;
pub mod telemetry;
pub mod template;
#[cfg(test)]
pub mod test_utils;
pub mod unit;
pub mod yaml;
