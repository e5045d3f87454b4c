pub mod auth;
pub mod config;
pub mod content;
pub mod error;
pub mod http;
pub mod model;
pub mod retry;
pub mod store;
pub mod workflow;

pub use error::{Error, Result};
