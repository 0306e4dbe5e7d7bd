//! Logging facade initialization.

mod init;

pub use init::{LoggingConfig, init_logging};
