//! Naming convention between plaintext and encrypted files
//!
//! A plaintext secret `config-secret.yaml` is paired with the encrypted file
//! `config-secret.enc.yaml`: the encrypted infix is inserted right before the
//! final extension. Going back, the infix is stripped and the secret suffix is
//! re-appended when missing.
//!
//! The reverse mapping is not a true inverse. `config.enc.yaml` decrypts to
//! `config-secret.yaml`, not `config.yaml`, because the suffix is appended to
//! any base that lacks it. This is long-standing behaviour that existing
//! trees depend on, so it is kept as is.
//!
//! Only the file name is split, on its final dot. A dot in a directory name
//! never counts. Dotfiles such as `.env` have no extension, so `.env` maps to
//! `.env.enc` and back to `.env.enc.dec`. Pattern-based discovery never yields
//! such names; they only arrive through the single-file commands.
//!
//! Names are handled as raw `OsStr` bytes, so a file name that is not valid
//! UTF-8 maps to a counterpart with exactly the same bytes around the tokens.
//!
//! All functions here are pure; nothing touches the filesystem.

use crate::config::{DEFAULT_ENCRYPTED_INFIX, DEFAULT_SECRET_SUFFIX};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

/// Appended to the input path when a decryption target cannot be derived
/// from the naming convention.
pub const FALLBACK_DECRYPTED_EXTENSION: &str = ".dec";

/// The two naming tokens that drive path derivation. Both are literal
/// substrings, never patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingConfig {
    pub secret_suffix: String,
    pub encrypted_infix: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            secret_suffix: DEFAULT_SECRET_SUFFIX.to_string(),
            encrypted_infix: DEFAULT_ENCRYPTED_INFIX.to_string(),
        }
    }
}

impl NamingConfig {
    /// `base + encrypted_infix + ext`.
    pub fn derive_encrypted_path(&self, plaintext_path: &Path) -> PathBuf {
        let Some((stem, ext)) = split_file_name(plaintext_path) else {
            let mut out = plaintext_path.as_os_str().to_os_string();
            out.push(&self.encrypted_infix);
            return PathBuf::from(out);
        };
        let mut name = stem.to_os_string();
        name.push(&self.encrypted_infix);
        push_extension(&mut name, ext);
        plaintext_path.with_file_name(name)
    }

    /// Inverse of [`derive_encrypted_path`](Self::derive_encrypted_path),
    /// with the suffix quirk described in the module docs.
    ///
    /// A path whose base does not end with the encrypted infix yields
    /// `path + ".dec"` instead.
    pub fn derive_decrypted_path(&self, encrypted_path: &Path) -> PathBuf {
        let stripped = split_file_name(encrypted_path).and_then(|(stem, ext)| {
            strip_os_suffix(stem, &self.encrypted_infix).map(|base| (base, ext))
        });
        let Some((mut name, ext)) = stripped else {
            let mut out = encrypted_path.as_os_str().to_os_string();
            out.push(FALLBACK_DECRYPTED_EXTENSION);
            return PathBuf::from(out);
        };

        if !os_ends_with(&name, &self.secret_suffix) {
            name.push(&self.secret_suffix);
        }
        push_extension(&mut name, ext);
        encrypted_path.with_file_name(name)
    }

    /// True when the file name carries the secret suffix.
    pub fn looks_like_secret(&self, path: &Path) -> bool {
        is_conventionally_named(path, &self.secret_suffix)
    }

    /// True when the file name carries the encrypted infix.
    pub fn looks_like_encrypted(&self, path: &Path) -> bool {
        is_conventionally_named(path, &self.encrypted_infix)
    }
}

/// Substring check on the file name. Only ever used to decide whether to
/// print a warning.
pub fn is_conventionally_named(path: &Path, token: &str) -> bool {
    let Some(name) = path.file_name() else {
        return false;
    };
    let token = token.as_bytes();
    token.is_empty()
        || name
            .as_encoded_bytes()
            .windows(token.len())
            .any(|w| w == token)
}

/// Split the file name into `(stem, ext)` where `ext` excludes the dot and is
/// `None` when the name has no extension. `None` overall when the path has no
/// file name (`..`, `/`).
fn split_file_name(path: &Path) -> Option<(&OsStr, Option<&OsStr>)> {
    Some((path.file_stem()?, path.extension()))
}

fn push_extension(name: &mut OsString, ext: Option<&OsStr>) {
    if let Some(ext) = ext {
        name.push(".");
        name.push(ext);
    }
}

fn os_ends_with(s: &OsStr, suffix: &str) -> bool {
    s.as_encoded_bytes().ends_with(suffix.as_bytes())
}

#[cfg(unix)]
fn strip_os_suffix(s: &OsStr, suffix: &str) -> Option<OsString> {
    use std::os::unix::ffi::OsStrExt;

    s.as_bytes()
        .strip_suffix(suffix.as_bytes())
        .map(|base| OsStr::from_bytes(base).to_os_string())
}

#[cfg(not(unix))]
fn strip_os_suffix(s: &OsStr, suffix: &str) -> Option<OsString> {
    // Non-Unix names that are not valid Unicode never match.
    s.to_str()?.strip_suffix(suffix).map(OsString::from)
}
