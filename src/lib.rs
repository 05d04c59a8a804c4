pub mod alert;
pub mod config;
pub mod error;
pub mod http;
pub mod output;
pub mod report;
pub mod runner;
pub mod snapshot;
pub mod submissions;
pub mod timeutil;
