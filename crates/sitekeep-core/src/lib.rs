pub mod archive;
pub mod config;
pub mod error;
pub mod exporter;
pub mod job;
pub mod platform;
pub mod retention;
pub mod scheduler;
pub mod selftest;
pub mod transfer;

pub mod testutil;
