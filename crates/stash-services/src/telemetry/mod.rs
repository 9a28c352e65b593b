//! Tracing initialization for Stash binaries

mod init_basic;

pub use init_basic::init_telemetry;
