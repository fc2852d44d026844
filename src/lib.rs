#[macro_use]
extern crate log;

pub mod admin;
pub mod config;
pub mod error;
pub mod handler;
pub mod service;
pub mod state;
pub mod storage;

/// Logging for both binaries: `RUST_LOG` wins, `info` otherwise.
pub fn init_logging() {
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "info");
    }
    let _ = pretty_env_logger::try_init_timed();
}
