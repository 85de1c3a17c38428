//! Candidate discovery
//!
//! Listing is delegated to an external traversal tool, `fd` when it is
//! installed and `find` otherwise. Which one to use is decided again on every
//! call so a tool installed or removed mid-session is picked up.

use crate::config::{Config, SearchTool};
use crate::error::{Error, ErrorCategory, ErrorKind, Result};
use crate::naming::NamingConfig;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info};

/// Binary names under which fd is distributed. Debian and Ubuntu ship it as
/// `fdfind`.
const FD_PROGRAMS: &[&str] = &["fd", "fdfind"];

/// Which kind of candidate a discovery pass looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Plaintext secrets, named `*<secret_suffix>.<ext>`.
    Encrypt,
    /// Encrypted files, named `*<encrypted_infix>.<ext>`.
    Decrypt,
}

impl Mode {
    pub fn verb(self) -> &'static str {
        match self {
            Mode::Encrypt => "encrypt",
            Mode::Decrypt => "decrypt",
        }
    }
}

/// A traversal tool able to list regular files by name glob.
pub trait SearchBackend {
    fn name(&self) -> &str;

    /// List regular files under `root` whose name matches `name_pattern`,
    /// leaving out any path that matches one of `excludes`.
    fn list_files(
        &self,
        root: &Path,
        name_pattern: &str,
        excludes: &[String],
    ) -> Result<Vec<PathBuf>>;
}

pub struct FdBackend {
    program: String,
    extra_args: Vec<String>,
}

impl FdBackend {
    pub fn new(program: impl Into<String>, extra_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            extra_args,
        }
    }
}

impl SearchBackend for FdBackend {
    fn name(&self) -> &str {
        &self.program
    }

    fn list_files(
        &self,
        root: &Path,
        name_pattern: &str,
        excludes: &[String],
    ) -> Result<Vec<PathBuf>> {
        let mut cmd = Command::new(&self.program);
        cmd.args(["--type", "f", "--glob", "--print0"]);
        // fd matches --exclude globs against whole names; wrap them so they
        // act as substrings, like find's -path below.
        for exclude in excludes {
            cmd.arg("--exclude").arg(format!("*{}*", exclude));
        }
        cmd.args(&self.extra_args).arg(name_pattern).arg(root);
        run_listing(&self.program, cmd)
    }
}

pub struct FindBackend {
    extra_args: Vec<String>,
}

impl FindBackend {
    pub fn new(extra_args: Vec<String>) -> Self {
        Self { extra_args }
    }
}

impl SearchBackend for FindBackend {
    fn name(&self) -> &str {
        "find"
    }

    fn list_files(
        &self,
        root: &Path,
        name_pattern: &str,
        excludes: &[String],
    ) -> Result<Vec<PathBuf>> {
        let mut cmd = Command::new("find");
        // Options such as -maxdepth must precede the tests.
        cmd.arg(root).args(&self.extra_args);
        cmd.args(["-type", "f", "-name", name_pattern]);
        for exclude in excludes {
            cmd.args(["-not", "-path"]).arg(format!("*{}*", exclude));
        }
        cmd.arg("-print0");
        run_listing("find", cmd)
    }
}

fn run_listing(program: &str, mut cmd: Command) -> Result<Vec<PathBuf>> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    debug!(command = ?cmd, "listing candidates");

    let output = cmd.output().map_err(|e| {
        Error::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Discovery,
            format!("failed to run {}", program),
            e,
        )
    })?;
    if !output.status.success() {
        return Err(Error::with_kind(
            ErrorCategory::User,
            ErrorKind::Discovery,
            format!(
                "{} failed: {}",
                program,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ));
    }

    Ok(split_nul_separated(&output.stdout))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Fd,
    Find,
}

/// `find` is honoured as is; `fd` falls back to `find` when fd is missing;
/// `auto` and unrecognized values prefer fd when present.
pub fn select_backend_kind(tool: &SearchTool, fd_available: bool) -> BackendKind {
    match tool {
        SearchTool::Find => BackendKind::Find,
        SearchTool::Fd | SearchTool::Auto | SearchTool::Other(_) => {
            if fd_available {
                BackendKind::Fd
            } else {
                BackendKind::Find
            }
        }
    }
}

/// Split NUL-separated tool output into paths, keeping the raw bytes of
/// every name.
fn split_nul_separated(stdout: &[u8]) -> Vec<PathBuf> {
    stdout
        .split(|b| *b == 0)
        .filter(|entry| !entry.is_empty())
        .map(path_from_bytes)
        .collect()
}

#[cfg(unix)]
fn path_from_bytes(bytes: &[u8]) -> PathBuf {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    PathBuf::from(OsStr::from_bytes(bytes))
}

#[cfg(not(unix))]
fn path_from_bytes(bytes: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(bytes).as_ref())
}

/// The first fd binary name that answers `--version`, if any.
fn detect_fd(programs: &[String]) -> Option<&str> {
    programs.iter().map(String::as_str).find(|program| {
        Command::new(program)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    })
}

/// Name glob for one configured file pattern.
///
/// The extension is whatever follows the first dot of the pattern, so
/// `*.yaml` gives `yaml` and `*.tar.gz` gives `tar.gz`.
pub fn name_filter(naming: &NamingConfig, mode: Mode, file_pattern: &str) -> String {
    let ext = file_pattern
        .split_once('.')
        .map(|(_, ext)| ext)
        .unwrap_or(file_pattern);
    let token = match mode {
        Mode::Encrypt => &naming.secret_suffix,
        Mode::Decrypt => &naming.encrypted_infix,
    };
    format!("*{}.{}", token, ext)
}

pub struct FileDiscovery<'a> {
    config: &'a Config,
    fd_programs: Vec<String>,
}

impl<'a> FileDiscovery<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            fd_programs: FD_PROGRAMS.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Replace the program names tried, in order, when looking for fd.
    pub fn with_fd_programs(mut self, programs: Vec<String>) -> Self {
        self.fd_programs = programs;
        self
    }

    /// Pick the traversal backend for this call.
    pub fn backend(&self) -> Box<dyn SearchBackend> {
        let fd = match self.config.search_tool {
            SearchTool::Find => None,
            _ => detect_fd(&self.fd_programs),
        };
        match (select_backend_kind(&self.config.search_tool, fd.is_some()), fd) {
            (BackendKind::Fd, Some(program)) => {
                Box::new(FdBackend::new(program, self.config.fd_options.clone()))
            }
            _ => {
                if self.config.search_tool == SearchTool::Fd {
                    info!("fd not found, falling back to find");
                }
                Box::new(FindBackend::new(self.config.find_options.clone()))
            }
        }
    }

    /// List every candidate for `mode` under `root`, pattern by pattern.
    ///
    /// Results are concatenated in pattern order and not de-duplicated.
    /// Order within a pattern is whatever the backend produces.
    pub fn list_candidates(&self, root: &Path, mode: Mode) -> Result<Vec<PathBuf>> {
        let backend = self.backend();
        self.list_candidates_with(backend.as_ref(), root, mode)
    }

    pub fn list_candidates_with(
        &self,
        backend: &dyn SearchBackend,
        root: &Path,
        mode: Mode,
    ) -> Result<Vec<PathBuf>> {
        debug!(backend = backend.name(), root = %root.display(), ?mode, "discovering");
        let mut candidates = Vec::new();
        for pattern in &self.config.file_patterns {
            let filter = name_filter(&self.config.naming, mode, pattern);
            let found = backend
                .list_files(root, &filter, &self.config.ignore_patterns)
                .map_err(|e| e.with_context(format!("failed to search for {}", filter)))?;
            candidates.extend(found);
        }
        Ok(candidates)
    }
}
