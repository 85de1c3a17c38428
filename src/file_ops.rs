//! Single-file encryption/decryption operations
//!
//! This module provides the `encrypt` / `decrypt` commands for one explicit
//! path, along with the transform-and-write steps the batch runner shares.

use crate::config::Config;
use crate::crypto::CryptoTransform;
use crate::detect::{self, SyncDecision};
use crate::error::{Error, ErrorCategory, ErrorKind, Result};
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

/// Result of a single-file command that did not hit a hard error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SingleOutcome {
    Encrypted { output: PathBuf },
    Decrypted { output: PathBuf },
    /// `encrypt` on a file that already looks encrypted.
    AlreadyEncrypted,
    /// `decrypt` on a file that does not look encrypted.
    NotEncrypted,
    /// The encrypted counterpart is at least as new as the plaintext.
    UpToDate { output: PathBuf },
    Failed { reason: String },
}

impl SingleOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, SingleOutcome::Failed { .. })
    }
}

/// Encrypt one plaintext file next to itself.
///
/// Fails only when `path` does not exist. Everything else, including a
/// failing crypto tool, is reported on `out` and returned as an outcome.
pub fn encrypt_one(
    config: &Config,
    crypto: &dyn CryptoTransform,
    path: &Path,
    force: bool,
    out: &mut dyn Write,
) -> Result<SingleOutcome> {
    ensure_exists(path)?;
    let naming = &config.naming;

    if detect::classify(path).is_encrypted() {
        say(
            out,
            format_args!("{} is already encrypted, nothing to do.", path.display()),
        )?;
        return Ok(SingleOutcome::AlreadyEncrypted);
    }

    if !naming.looks_like_secret(path) {
        say(
            out,
            format_args!(
                "Warning: {} does not contain '{}'; it will not be picked up by encrypt-all.",
                path.display(),
                naming.secret_suffix
            ),
        )?;
    }

    let output = naming.derive_encrypted_path(path);
    if detect::sync_decision(path, &output, force) == SyncDecision::UpToDate {
        say(
            out,
            format_args!(
                "{} is up-to-date, skipping (use --force to re-encrypt).",
                output.display()
            ),
        )?;
        return Ok(SingleOutcome::UpToDate { output });
    }

    match encrypt_to(crypto, path, &output) {
        Ok(()) => {
            say(
                out,
                format_args!("Encrypted {} -> {}", path.display(), output.display()),
            )?;
            Ok(SingleOutcome::Encrypted { output })
        }
        Err(e) => {
            let reason = e.chain_message();
            say(
                out,
                format_args!("Failed to encrypt {}: {}", path.display(), reason),
            )?;
            Ok(SingleOutcome::Failed { reason })
        }
    }
}

/// Decrypt one encrypted file next to itself.
///
/// A file without the encrypted infix in its name decrypts to
/// `<path>.dec`.
pub fn decrypt_one(
    config: &Config,
    crypto: &dyn CryptoTransform,
    path: &Path,
    out: &mut dyn Write,
) -> Result<SingleOutcome> {
    ensure_exists(path)?;
    let naming = &config.naming;

    if !detect::classify(path).is_encrypted() {
        say(
            out,
            format_args!("{} does not appear to be encrypted, nothing to do.", path.display()),
        )?;
        return Ok(SingleOutcome::NotEncrypted);
    }

    if !naming.looks_like_encrypted(path) {
        say(
            out,
            format_args!(
                "Warning: {} does not contain '{}'; writing output with a .dec extension.",
                path.display(),
                naming.encrypted_infix
            ),
        )?;
    }

    let output = naming.derive_decrypted_path(path);
    match decrypt_to(crypto, path, &output) {
        Ok(()) => {
            say(
                out,
                format_args!("Decrypted {} -> {}", path.display(), output.display()),
            )?;
            Ok(SingleOutcome::Decrypted { output })
        }
        Err(e) => {
            let reason = e.chain_message();
            say(
                out,
                format_args!("Failed to decrypt {}: {}", path.display(), reason),
            )?;
            Ok(SingleOutcome::Failed { reason })
        }
    }
}

/// Unix mode of encrypted outputs, which are meant to be committed and shared.
pub const ENCRYPTED_OUTPUT_MODE: u32 = 0o644;

/// Unix mode of decrypted outputs: owner-only.
pub const DECRYPTED_OUTPUT_MODE: u32 = 0o600;

/// Run the crypto tool on `input` and store the ciphertext at `output`.
pub fn encrypt_to(crypto: &dyn CryptoTransform, input: &Path, output: &Path) -> Result<()> {
    let ciphertext = crypto.encrypt(input)?;
    write_output(output, &ciphertext, ENCRYPTED_OUTPUT_MODE)
}

/// Run the crypto tool on `input` and store the plaintext at `output`.
pub fn decrypt_to(crypto: &dyn CryptoTransform, input: &Path, output: &Path) -> Result<()> {
    let plaintext = crypto.decrypt(input)?;
    write_output(output, &plaintext, DECRYPTED_OUTPUT_MODE)
}

/// Atomically replace `path` with `contents` (tempfile + fsync + rename).
///
/// Either the old file or the complete new file exists afterwards, never a
/// partial one. `mode` applies on Unix only.
fn write_output(path: &Path, contents: &[u8], mode: u32) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp_file = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| io_error(format!("failed to create tempfile in {}", dir.display()), e))?;

    temp_file
        .write_all(contents)
        .map_err(|e| io_error("failed to write to tempfile", e))?;
    temp_file
        .flush()
        .map_err(|e| io_error("failed to flush tempfile", e))?;
    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| io_error("failed to sync file prior to rename", e))?;

    #[cfg(unix)]
    {
        use std::fs::Permissions;
        use std::os::unix::fs::PermissionsExt;
        temp_file
            .as_file()
            .set_permissions(Permissions::from_mode(mode))
            .map_err(|e| io_error("failed to set tempfile permissions", e))?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    temp_file.persist(path).map_err(|e| {
        Error::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            format!("failed to rename to target file {}", path.display()),
            e,
        )
    })?;
    debug!(path = %path.display(), bytes = contents.len(), "wrote output");
    Ok(())
}

fn ensure_exists(path: &Path) -> Result<()> {
    if path.is_file() {
        return Ok(());
    }
    Err(Error::with_kind(
        ErrorCategory::User,
        ErrorKind::NotFound,
        format!("no valid file specified: file not found: {}", path.display()),
    ))
}

/// Write one line of user-facing output.
pub(crate) fn say(out: &mut dyn Write, line: fmt::Arguments<'_>) -> Result<()> {
    out.write_fmt(line)
        .and_then(|()| out.write_all(b"\n"))
        .map_err(|e| io_error("failed to write report", e))
}

fn io_error(msg: impl Into<String>, err: io::Error) -> Error {
    let category = if err.kind() == io::ErrorKind::NotFound
        || err.kind() == io::ErrorKind::PermissionDenied
    {
        ErrorCategory::User
    } else {
        ErrorCategory::Internal
    };
    Error::with_kind_and_source(category, ErrorKind::Io, msg, err)
}
