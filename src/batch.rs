//! Batch encryption/decryption over a directory tree
//!
//! Every candidate is handled to completion before the next one starts. A
//! failure on one file is reported and counted, never propagated.

use crate::config::Config;
use crate::crypto::CryptoTransform;
use crate::detect::{self, SyncDecision};
use crate::discovery::{FileDiscovery, Mode};
use crate::error::Result;
use crate::file_ops::{decrypt_to, encrypt_to, say};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Encrypted,
    Decrypted,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileResult {
    pub path: PathBuf,
    pub outcome: FileOutcome,
    pub reason: Option<String>,
}

/// Counters and per-file records for one batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationOutcome {
    pub mode: Mode,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub results: Vec<FileResult>,
}

impl OperationOutcome {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            succeeded: 0,
            skipped: 0,
            failed: 0,
            results: Vec::new(),
        }
    }

    pub fn record(&mut self, path: PathBuf, outcome: FileOutcome, reason: Option<String>) {
        match outcome {
            FileOutcome::Encrypted | FileOutcome::Decrypted => self.succeeded += 1,
            FileOutcome::Skipped => self.skipped += 1,
            FileOutcome::Failed => self.failed += 1,
        }
        self.results.push(FileResult {
            path,
            outcome,
            reason,
        });
    }

    pub fn outcome_of(&self, path: &Path) -> Option<FileOutcome> {
        self.results
            .iter()
            .find(|r| r.path == path)
            .map(|r| r.outcome)
    }

    /// Summary lines printed after the last file.
    pub fn summary(&self) -> Vec<String> {
        let verb = self.mode.verb();
        let past = match self.mode {
            Mode::Encrypt => "Encrypted",
            Mode::Decrypt => "Decrypted",
        };

        let mut lines = Vec::new();
        let headline = match (self.succeeded, self.skipped) {
            (0, 0) if self.failed == 0 => format!("No files found to {}.", verb),
            (0, 0) => format!("No files {}ed.", verb),
            (0, skipped) => format!("No files {}ed, {} files already up-to-date.", verb, skipped),
            (done, 0) => format!("{} {} files successfully.", past, done),
            (done, skipped) => format!(
                "{} {} files successfully, {} files already up-to-date.",
                past, done, skipped
            ),
        };
        lines.push(headline);
        if self.failed > 0 {
            lines.push(format!("Failed to {} {} files.", verb, self.failed));
        }
        lines
    }
}

pub struct BatchOrchestrator<'a> {
    config: &'a Config,
    crypto: &'a dyn CryptoTransform,
}

impl<'a> BatchOrchestrator<'a> {
    pub fn new(config: &'a Config, crypto: &'a dyn CryptoTransform) -> Self {
        Self { config, crypto }
    }

    /// `encrypt-all`: encrypt every stale plaintext secret under `root`
    /// (the current directory when `None`).
    pub fn encrypt_all(
        &self,
        root: Option<&Path>,
        force: bool,
        out: &mut dyn Write,
    ) -> Result<OperationOutcome> {
        self.run(root, Mode::Encrypt, force, out)
    }

    /// `decrypt-all`: decrypt every encrypted file under `root`.
    ///
    /// There is no staleness check here; every candidate is decrypted.
    pub fn decrypt_all(&self, root: Option<&Path>, out: &mut dyn Write) -> Result<OperationOutcome> {
        self.run(root, Mode::Decrypt, false, out)
    }

    fn run(
        &self,
        root: Option<&Path>,
        mode: Mode,
        force: bool,
        out: &mut dyn Write,
    ) -> Result<OperationOutcome> {
        let root = root.unwrap_or(Path::new("."));
        let candidates = FileDiscovery::new(self.config).list_candidates(root, mode)?;
        info!(count = candidates.len(), ?mode, root = %root.display(), "candidates discovered");
        self.process(candidates, mode, force, out)
    }

    /// Handle an already discovered candidate list.
    pub fn process(
        &self,
        candidates: Vec<PathBuf>,
        mode: Mode,
        force: bool,
        out: &mut dyn Write,
    ) -> Result<OperationOutcome> {
        let mut outcome = OperationOutcome::new(mode);
        for candidate in candidates {
            match mode {
                Mode::Encrypt => self.encrypt_candidate(candidate, force, &mut outcome, out)?,
                Mode::Decrypt => self.decrypt_candidate(candidate, &mut outcome, out)?,
            }
        }
        for line in outcome.summary() {
            say(out, format_args!("{}", line))?;
        }
        Ok(outcome)
    }

    fn encrypt_candidate(
        &self,
        candidate: PathBuf,
        force: bool,
        outcome: &mut OperationOutcome,
        out: &mut dyn Write,
    ) -> Result<()> {
        let output = self.config.naming.derive_encrypted_path(&candidate);
        if detect::sync_decision(&candidate, &output, force) == SyncDecision::UpToDate {
            debug!(path = %candidate.display(), "up-to-date");
            say(out, format_args!("Skipping {} (up-to-date)", candidate.display()))?;
            outcome.record(candidate, FileOutcome::Skipped, Some("up-to-date".to_string()));
            return Ok(());
        }

        say(
            out,
            format_args!("Encrypting {} -> {}", candidate.display(), output.display()),
        )?;
        match encrypt_to(self.crypto, &candidate, &output) {
            Ok(()) => outcome.record(candidate, FileOutcome::Encrypted, None),
            Err(e) => {
                let reason = e.chain_message();
                say(
                    out,
                    format_args!("Failed to encrypt {}: {}", candidate.display(), reason),
                )?;
                outcome.record(candidate, FileOutcome::Failed, Some(reason));
            }
        }
        Ok(())
    }

    fn decrypt_candidate(
        &self,
        candidate: PathBuf,
        outcome: &mut OperationOutcome,
        out: &mut dyn Write,
    ) -> Result<()> {
        let output = self.config.naming.derive_decrypted_path(&candidate);
        say(
            out,
            format_args!("Decrypting {} -> {}", candidate.display(), output.display()),
        )?;
        match decrypt_to(self.crypto, &candidate, &output) {
            Ok(()) => outcome.record(candidate, FileOutcome::Decrypted, None),
            Err(e) => {
                let reason = e.chain_message();
                say(
                    out,
                    format_args!("Failed to decrypt {}: {}", candidate.display(), reason),
                )?;
                outcome.record(candidate, FileOutcome::Failed, Some(reason));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchTool;
    use crate::crypto::fake::FakeTransform;
    use std::fs::{self, File};
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn set_mtime(path: &Path, time: SystemTime) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    fn find_config() -> Config {
        Config {
            search_tool: SearchTool::Find,
            ..Config::default()
        }
    }

    #[test]
    fn test_summary_phrasings() {
        let mut o = OperationOutcome::new(Mode::Encrypt);
        assert_eq!(o.summary(), vec!["No files found to encrypt."]);

        o.record("a".into(), FileOutcome::Skipped, None);
        assert_eq!(
            o.summary(),
            vec!["No files encrypted, 1 files already up-to-date."]
        );

        o.record("b".into(), FileOutcome::Encrypted, None);
        assert_eq!(
            o.summary(),
            vec!["Encrypted 1 files successfully, 1 files already up-to-date."]
        );

        let mut o = OperationOutcome::new(Mode::Decrypt);
        o.record("c".into(), FileOutcome::Decrypted, None);
        o.record("d".into(), FileOutcome::Decrypted, None);
        assert_eq!(o.summary(), vec!["Decrypted 2 files successfully."]);

        o.record("e".into(), FileOutcome::Failed, Some("boom".into()));
        assert_eq!(
            o.summary(),
            vec!["Decrypted 2 files successfully.", "Failed to decrypt 1 files."]
        );
    }

    #[test]
    fn test_summary_only_failures() {
        let mut o = OperationOutcome::new(Mode::Encrypt);
        o.record("a".into(), FileOutcome::Failed, Some("boom".into()));
        assert_eq!(
            o.summary(),
            vec!["No files encrypted.", "Failed to encrypt 1 files."]
        );
    }

    #[test]
    fn test_process_mixed_candidates() {
        let dir = TempDir::new().unwrap();
        let fresh = dir.path().join("new-secret.yaml");
        let stale = dir.path().join("stale-secret.yaml");
        let current = dir.path().join("current-secret.yaml");
        for p in [&fresh, &stale, &current] {
            fs::write(p, "k: v\n").unwrap();
        }
        let now = SystemTime::now();
        let stale_enc = dir.path().join("stale-secret.enc.yaml");
        fs::write(&stale_enc, "old").unwrap();
        set_mtime(&stale_enc, now - Duration::from_secs(120));
        set_mtime(&stale, now);
        let current_enc = dir.path().join("current-secret.enc.yaml");
        fs::write(&current_enc, "old").unwrap();
        set_mtime(&current, now - Duration::from_secs(120));
        set_mtime(&current_enc, now);

        let config = Config::default();
        let crypto = FakeTransform::default();
        let mut out = Vec::new();
        let outcome = BatchOrchestrator::new(&config, &crypto)
            .process(
                vec![fresh.clone(), stale.clone(), current.clone()],
                Mode::Encrypt,
                false,
                &mut out,
            )
            .unwrap();

        assert_eq!(outcome.succeeded, 2);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.failed, 0);
        assert_eq!(outcome.outcome_of(&current), Some(FileOutcome::Skipped));
        assert_eq!(fs::read(&current_enc).unwrap(), b"old");
        assert_eq!(fs::read(&stale_enc).unwrap(), b"ENC[k: v\n]");
        assert_eq!(crypto.encrypt_calls.get(), 2);
        assert!(String::from_utf8_lossy(&out)
            .contains("Encrypted 2 files successfully, 1 files already up-to-date."));
    }

    #[test]
    fn test_force_never_skips() {
        let dir = TempDir::new().unwrap();
        let plain = dir.path().join("a-secret.json");
        let enc = dir.path().join("a-secret.enc.json");
        fs::write(&plain, "{}").unwrap();
        fs::write(&enc, "old").unwrap();
        let now = SystemTime::now();
        set_mtime(&plain, now - Duration::from_secs(120));
        set_mtime(&enc, now);

        let config = Config::default();
        let crypto = FakeTransform::default();
        let outcome = BatchOrchestrator::new(&config, &crypto)
            .process(vec![plain.clone()], Mode::Encrypt, true, &mut Vec::new())
            .unwrap();
        assert_eq!(outcome.skipped, 0);
        assert_eq!(outcome.succeeded, 1);
        assert_eq!(fs::read(&enc).unwrap(), b"ENC[{}]");
    }

    #[test]
    fn test_failures_do_not_abort_batch() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.enc.yaml");
        let b = dir.path().join("b.enc.yaml");
        fs::write(&a, "not wrapped").unwrap();
        fs::write(&b, "ENC[b: 1\n]").unwrap();

        let config = Config::default();
        let crypto = FakeTransform::default();
        let outcome = BatchOrchestrator::new(&config, &crypto)
            .process(vec![a.clone(), b.clone()], Mode::Decrypt, false, &mut Vec::new())
            .unwrap();

        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.succeeded, 1);
        assert_eq!(crypto.decrypt_calls.get(), 2);
        assert_eq!(outcome.outcome_of(&a), Some(FileOutcome::Failed));
        // Non-suffixed base gains the suffix on the way back.
        assert_eq!(
            fs::read(dir.path().join("b-secret.yaml")).unwrap(),
            b"b: 1\n"
        );
    }

    #[test]
    fn test_decrypt_has_no_staleness_gate() {
        let dir = TempDir::new().unwrap();
        let enc = dir.path().join("x-secret.enc.yaml");
        let plain = dir.path().join("x-secret.yaml");
        fs::write(&enc, "ENC[x: 1\n]").unwrap();
        fs::write(&plain, "x: edited\n").unwrap();
        let now = SystemTime::now();
        set_mtime(&enc, now - Duration::from_secs(120));
        set_mtime(&plain, now);

        let config = Config::default();
        let crypto = FakeTransform::default();
        let outcome = BatchOrchestrator::new(&config, &crypto)
            .process(vec![enc], Mode::Decrypt, false, &mut Vec::new())
            .unwrap();
        assert_eq!(outcome.succeeded, 1);
        assert_eq!(fs::read(&plain).unwrap(), b"x: 1\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_encrypt_all_discovers_and_encrypts() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("svc")).unwrap();
        fs::write(dir.path().join("config-secret.yaml"), "a: 1\n").unwrap();
        fs::write(dir.path().join("svc/api-secret.env"), "K=v\n").unwrap();
        fs::write(dir.path().join("svc/readme.txt"), "hi\n").unwrap();

        let config = find_config();
        let crypto = FakeTransform::default();
        let mut out = Vec::new();
        let outcome = BatchOrchestrator::new(&config, &crypto)
            .encrypt_all(Some(dir.path()), false, &mut out)
            .unwrap();

        assert_eq!(outcome.succeeded, 2);
        assert!(dir.path().join("config-secret.enc.yaml").exists());
        assert!(dir.path().join("svc/api-secret.enc.env").exists());
        assert!(!dir.path().join("svc/readme.enc.txt").exists());

        // A second run finds everything up to date.
        let outcome = BatchOrchestrator::new(&config, &crypto)
            .encrypt_all(Some(dir.path()), false, &mut out)
            .unwrap();
        assert_eq!(outcome.succeeded, 0);
        assert_eq!(outcome.skipped, 2);
        assert_eq!(crypto.encrypt_calls.get(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_decrypt_all_empty_tree() {
        let dir = TempDir::new().unwrap();
        let config = find_config();
        let crypto = FakeTransform::default();
        let mut out = Vec::new();
        let outcome = BatchOrchestrator::new(&config, &crypto)
            .decrypt_all(Some(dir.path()), &mut out)
            .unwrap();
        assert!(outcome.results.is_empty());
        assert_eq!(
            String::from_utf8_lossy(&out).trim(),
            "No files found to decrypt."
        );
    }
}
