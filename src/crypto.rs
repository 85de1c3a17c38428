//! Bridge to the external crypto tool
//!
//! The orchestration logic only needs two opaque operations, encrypt a file
//! and decrypt a file, each returning the transformed bytes. [`SopsTransform`]
//! implements them by running the `sops` binary and capturing its stdout.

use crate::config::Config;
use crate::error::{Error, ErrorCategory, ErrorKind, Result};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

/// Trait for turning a file into its encrypted or decrypted bytes
pub trait CryptoTransform {
    /// Encrypt the plaintext file at `path`, returning the ciphertext.
    fn encrypt(&self, path: &Path) -> Result<Vec<u8>>;

    /// Decrypt the ciphertext file at `path`, returning the plaintext.
    fn decrypt(&self, path: &Path) -> Result<Vec<u8>>;
}

/// Runs `sops --encrypt` / `sops --decrypt`
pub struct SopsTransform {
    binary: PathBuf,
    options: Vec<String>,
}

impl SopsTransform {
    pub fn new(binary: impl Into<PathBuf>, options: Vec<String>) -> Self {
        Self {
            binary: binary.into(),
            options,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.sops_binary, config.sops_options.clone())
    }

    /// Fails with `ToolUnavailable` unless the binary runs and answers
    /// `--version` successfully.
    pub fn check_available(&self) -> Result<()> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                Error::with_kind_and_source(
                    ErrorCategory::User,
                    ErrorKind::ToolUnavailable,
                    format!(
                        "{} is not installed or not executable",
                        self.binary.display()
                    ),
                    e,
                )
            })?;

        if !output.status.success() {
            return Err(Error::with_kind(
                ErrorCategory::User,
                ErrorKind::ToolUnavailable,
                format!(
                    "{} --version exited with {}",
                    self.binary.display(),
                    output.status
                ),
            ));
        }
        let version = String::from_utf8_lossy(&output.stdout);
        debug!(version = version.trim(), "crypto tool available");
        Ok(())
    }

    fn run(&self, action: &str, path: &Path) -> Result<Vec<u8>> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(&self.options)
            .arg(action)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        debug!(command = ?cmd, "running crypto tool");

        let output = cmd.output().map_err(|e| {
            Error::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("failed to run {}", self.binary.display()),
                e,
            )
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr.trim();
            let reason = if reason.is_empty() {
                format!("exited with {}", output.status)
            } else {
                reason.to_string()
            };
            return Err(Error::with_kind(
                ErrorCategory::User,
                ErrorKind::TransformFailed,
                format!("{} {} failed: {}", tool_name(&self.binary), action, reason),
            ));
        }
        Ok(output.stdout)
    }
}

impl CryptoTransform for SopsTransform {
    fn encrypt(&self, path: &Path) -> Result<Vec<u8>> {
        self.run("--encrypt", path)
    }

    fn decrypt(&self, path: &Path) -> Result<Vec<u8>> {
        self.run("--decrypt", path)
    }
}

fn tool_name(binary: &Path) -> String {
    binary
        .file_name()
        .unwrap_or(OsStr::new("sops"))
        .to_string_lossy()
        .into_owned()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_binary_is_unavailable() {
        let sops = SopsTransform::new("/nonexistent/dir/sops-not-here", Vec::new());
        let err = sops.check_available().expect_err("expected missing tool");
        assert_eq!(err.kind, Some(ErrorKind::ToolUnavailable));
        assert_eq!(err.category, ErrorCategory::User);
    }

    #[test]
    fn test_missing_binary_transform_is_io_error() {
        let sops = SopsTransform::new("/nonexistent/dir/sops-not-here", Vec::new());
        let err = sops
            .encrypt(Path::new("a-secret.yaml"))
            .expect_err("expected spawn failure");
        assert_eq!(err.kind, Some(ErrorKind::Io));
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_is_transform_failure() {
        // `false` ignores its arguments and always exits 1.
        let sops = SopsTransform::new("false", Vec::new());
        let err = sops
            .decrypt(Path::new("a.enc.yaml"))
            .expect_err("expected transform failure");
        assert_eq!(err.kind, Some(ErrorKind::TransformFailed));
        assert!(err.message().contains("--decrypt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_stdout_is_captured() {
        // `echo --encrypt a-secret.yaml` stands in for sops output.
        let sops = SopsTransform::new("echo", Vec::new());
        let out = sops.encrypt(Path::new("a-secret.yaml")).unwrap();
        assert_eq!(out, b"--encrypt a-secret.yaml\n");
    }
}
