pub mod access;
pub mod config;
pub mod error;

pub use access::{AccessContext, Permission};
pub use config::AppConfig;
pub use error::{CoachError, CoachResult};
