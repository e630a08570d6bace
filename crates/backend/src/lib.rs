pub mod actor;
pub mod context;
pub mod engine;
pub mod service;
pub mod storage;

pub mod domain;
pub use domain::config;

pub mod dirs;

mod daemon;
pub use daemon::{App, Daemon, DaemonError, RuntimeConfig};
