pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod deadline;
pub mod error;
pub mod provision;

pub use error::{Error, Result};
