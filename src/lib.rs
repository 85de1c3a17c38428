//! sops-batch - convention-driven batch encryption of secret files with sops

#![forbid(unsafe_code)]

pub mod batch;
pub mod config;
pub mod crypto;
pub mod detect;
pub mod discovery;
pub mod error;
pub mod file_ops;
pub mod naming;

pub use error::{Error, ErrorCategory, ErrorKind, Result};
