// Library crate exposing modules for the binary and integration tests

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod repository;
pub mod store;
pub mod util;
