//! Encryption state detection
//!
//! Two read-only questions are answered here: does a file look like sops
//! output, and is an encrypted counterpart older than its plaintext.

use std::fs;
use std::path::Path;
use std::time::SystemTime;

use tracing::{debug, trace};

/// Top-level metadata key sops writes into every structured document.
pub const HEADER_MARKER: &str = "sops:";

/// Prefix of every value sops encrypts inline.
pub const INLINE_MARKER: &str = "ENC[";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClassification {
    Plaintext,
    Encrypted,
    /// Content could not be examined. [`classify`] never produces this; it
    /// is available to callers and must be treated like `Plaintext`.
    Unknown,
}

impl FileClassification {
    pub fn is_encrypted(self) -> bool {
        self == FileClassification::Encrypted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
    NeedsEncrypt,
    UpToDate,
    /// No encrypted file exists yet. Encryption is required.
    NoCounterpart,
}

impl SyncDecision {
    pub fn requires_encryption(self) -> bool {
        !matches!(self, SyncDecision::UpToDate)
    }
}

/// Classify a file by scanning its content for either sops marker.
///
/// A file that cannot be read is reported as `Plaintext` so it still reaches
/// the crypto tool, which then produces a proper error for it.
pub fn classify(path: &Path) -> FileClassification {
    match fs::read(path) {
        Ok(content) => classify_bytes(&content),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "unreadable file classified as plaintext");
            FileClassification::Plaintext
        }
    }
}

pub fn classify_bytes(content: &[u8]) -> FileClassification {
    if contains(content, HEADER_MARKER.as_bytes()) || contains(content, INLINE_MARKER.as_bytes()) {
        FileClassification::Encrypted
    } else {
        FileClassification::Plaintext
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// The staleness gate for encryption.
///
/// True when `encrypted_path` is missing or `plaintext_path` was modified
/// strictly later. If either timestamp is unavailable while the encrypted file
/// exists, the answer is true.
pub fn needs_encryption(plaintext_path: &Path, encrypted_path: &Path) -> bool {
    sync_decision(plaintext_path, encrypted_path, false).requires_encryption()
}

/// Full decision for one plaintext/encrypted pair. `force` always yields
/// `NeedsEncrypt` without touching the filesystem.
pub fn sync_decision(plaintext_path: &Path, encrypted_path: &Path, force: bool) -> SyncDecision {
    if force {
        return SyncDecision::NeedsEncrypt;
    }
    if !encrypted_path.exists() {
        return SyncDecision::NoCounterpart;
    }
    let decision = match (modified(plaintext_path), modified(encrypted_path)) {
        (Some(plain), Some(enc)) if plain > enc => SyncDecision::NeedsEncrypt,
        (Some(_), Some(_)) => SyncDecision::UpToDate,
        _ => SyncDecision::NeedsEncrypt,
    };
    trace!(
        plaintext = %plaintext_path.display(),
        encrypted = %encrypted_path.display(),
        ?decision,
        "staleness gate"
    );
    decision
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;
    use tempfile::TempDir;

    fn set_mtime(path: &Path, time: SystemTime) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(time).unwrap();
    }

    #[test]
    fn test_classify_header_marker() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.enc.yaml");
        fs::write(&path, "password: hunter2\nsops:\n    version: 3.8.1\n").unwrap();
        assert_eq!(classify(&path), FileClassification::Encrypted);
    }

    #[test]
    fn test_classify_inline_marker() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.enc.env");
        fs::write(&path, "TOKEN=ENC[AES256_GCM,data:abc,iv:def,tag:ghi,type:str]\n").unwrap();
        assert_eq!(classify(&path), FileClassification::Encrypted);
    }

    #[test]
    fn test_classify_plaintext() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a-secret.yaml");
        fs::write(&path, "password: hunter2\nsops_like: no\n").unwrap();
        assert_eq!(classify(&path), FileClassification::Plaintext);
    }

    #[test]
    fn test_classify_empty_and_binary() {
        assert_eq!(classify_bytes(b""), FileClassification::Plaintext);
        assert_eq!(
            classify_bytes(&[0xff, 0x00, b'E', b'N', b'C', b'[', 0x01]),
            FileClassification::Encrypted
        );
    }

    #[test]
    fn test_classify_unreadable_is_plaintext() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            classify(&dir.path().join("missing.yaml")),
            FileClassification::Plaintext
        );
        // A directory cannot be read as a file either.
        assert_eq!(classify(dir.path()), FileClassification::Plaintext);
    }

    #[test]
    fn test_needs_encryption_without_counterpart() {
        let dir = TempDir::new().unwrap();
        let plain = dir.path().join("a-secret.yaml");
        fs::write(&plain, "k: v\n").unwrap();
        set_mtime(&plain, SystemTime::UNIX_EPOCH + Duration::from_secs(1));

        let enc = dir.path().join("a-secret.enc.yaml");
        assert!(needs_encryption(&plain, &enc));
        assert_eq!(sync_decision(&plain, &enc, false), SyncDecision::NoCounterpart);
    }

    #[test]
    fn test_needs_encryption_when_plaintext_newer() {
        let dir = TempDir::new().unwrap();
        let plain = dir.path().join("a-secret.yaml");
        let enc = dir.path().join("a-secret.enc.yaml");
        fs::write(&plain, "k: v\n").unwrap();
        fs::write(&enc, "k: ENC[x]\n").unwrap();
        let now = SystemTime::now();
        set_mtime(&enc, now - Duration::from_secs(60));
        set_mtime(&plain, now);
        assert!(needs_encryption(&plain, &enc));
    }

    #[test]
    fn test_up_to_date_when_counterpart_not_older() {
        let dir = TempDir::new().unwrap();
        let plain = dir.path().join("a-secret.yaml");
        let enc = dir.path().join("a-secret.enc.yaml");
        fs::write(&plain, "k: v\n").unwrap();
        fs::write(&enc, "k: ENC[x]\n").unwrap();
        let now = SystemTime::now();

        set_mtime(&plain, now - Duration::from_secs(60));
        set_mtime(&enc, now);
        assert!(!needs_encryption(&plain, &enc));

        // Equal timestamps count as up to date.
        set_mtime(&plain, now);
        assert!(!needs_encryption(&plain, &enc));
        assert_eq!(sync_decision(&plain, &enc, false), SyncDecision::UpToDate);
    }

    #[test]
    fn test_force_overrides_gate() {
        let dir = TempDir::new().unwrap();
        let plain = dir.path().join("a-secret.yaml");
        let enc = dir.path().join("a-secret.enc.yaml");
        fs::write(&plain, "k: v\n").unwrap();
        fs::write(&enc, "k: ENC[x]\n").unwrap();
        assert_eq!(sync_decision(&plain, &enc, true), SyncDecision::NeedsEncrypt);
    }
}
