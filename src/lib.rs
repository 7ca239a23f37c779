//! Packweight - config files and scripted scenarios for the weight engine

pub mod config_file;
pub mod scenario;
