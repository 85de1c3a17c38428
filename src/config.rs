//! Runtime configuration
//!
//! All settings come from environment variables with static fallbacks. The
//! resulting [`Config`] is built once at start-up and handed by reference to
//! every component; nothing else in the crate reads the environment.

use crate::error::{Error, ErrorCategory, ErrorKind, Result};
use crate::naming::NamingConfig;
use std::fmt::Write as _;
use std::path::PathBuf;

pub const DEFAULT_FILE_PATTERNS: &str = "*.yaml *.yml *.json *.env *.txt";
pub const DEFAULT_SECRET_SUFFIX: &str = "-secret";
pub const DEFAULT_ENCRYPTED_INFIX: &str = ".enc";
pub const DEFAULT_IGNORE_PATTERNS: &str = "node_modules .git .svn .hg";
pub const DEFAULT_FD_OPTIONS: &str = "--hidden --no-ignore";
pub const DEFAULT_SOPS_BINARY: &str = "sops";

/// Which traversal tool discovery should use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchTool {
    Auto,
    Fd,
    Find,
    /// Anything else; behaves like `Auto`.
    Other(String),
}

impl SearchTool {
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "" | "auto" => SearchTool::Auto,
            "fd" => SearchTool::Fd,
            "find" => SearchTool::Find,
            other => SearchTool::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SearchTool::Auto => "auto",
            SearchTool::Fd => "fd",
            SearchTool::Find => "find",
            SearchTool::Other(s) => s,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub naming: NamingConfig,
    pub file_patterns: Vec<String>,
    pub ignore_patterns: Vec<String>,
    pub search_tool: SearchTool,
    pub fd_options: Vec<String>,
    pub find_options: Vec<String>,
    pub sops_binary: PathBuf,
    pub sops_options: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            naming: NamingConfig::default(),
            file_patterns: split_words(DEFAULT_FILE_PATTERNS),
            ignore_patterns: split_words(DEFAULT_IGNORE_PATTERNS),
            search_tool: SearchTool::Auto,
            fd_options: split_words(DEFAULT_FD_OPTIONS),
            find_options: Vec::new(),
            sops_binary: PathBuf::from(DEFAULT_SOPS_BINARY),
            sops_options: Vec::new(),
        }
    }
}

impl Config {
    /// Build the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    ///
    /// A variable that is unset falls back to its default. A variable that is
    /// set, even to an empty string, is taken as given; empty naming tokens
    /// are then rejected by validation.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let config = Self {
            naming: NamingConfig {
                secret_suffix: get("SECRET_SUFFIX", DEFAULT_SECRET_SUFFIX),
                encrypted_infix: get("ENCRYPTED_INFIX", DEFAULT_ENCRYPTED_INFIX),
            },
            file_patterns: split_words(&get("FILE_PATTERNS", DEFAULT_FILE_PATTERNS)),
            ignore_patterns: split_words(&get("IGNORE_PATTERNS", DEFAULT_IGNORE_PATTERNS)),
            search_tool: SearchTool::parse(&get("SEARCH_TOOL", "auto")),
            fd_options: split_words(&get("FD_OPTIONS", DEFAULT_FD_OPTIONS)),
            find_options: split_words(&get("FIND_OPTIONS", "")),
            sops_binary: PathBuf::from(get("SOPS_BINARY", DEFAULT_SOPS_BINARY)),
            sops_options: split_words(&get("SOPS_OPTIONS", "")),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.naming.secret_suffix.is_empty() {
            return Err(Error::with_kind(
                ErrorCategory::User,
                ErrorKind::Config,
                "SECRET_SUFFIX must not be empty",
            ));
        }
        if self.naming.encrypted_infix.is_empty() {
            return Err(Error::with_kind(
                ErrorCategory::User,
                ErrorKind::Config,
                "ENCRYPTED_INFIX must not be empty",
            ));
        }
        if self.sops_binary.as_os_str().is_empty() {
            return Err(Error::with_kind(
                ErrorCategory::User,
                ErrorKind::Config,
                "SOPS_BINARY must not be empty",
            ));
        }
        Ok(())
    }

    /// Human-readable listing of the active values, as printed by `show-config`.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Current configuration:");
        let _ = writeln!(out, "  FILE_PATTERNS:   {}", self.file_patterns.join(" "));
        let _ = writeln!(out, "  SECRET_SUFFIX:   {}", self.naming.secret_suffix);
        let _ = writeln!(out, "  ENCRYPTED_INFIX: {}", self.naming.encrypted_infix);
        let _ = writeln!(out, "  IGNORE_PATTERNS: {}", self.ignore_patterns.join(" "));
        let _ = writeln!(out, "  SEARCH_TOOL:     {}", self.search_tool.as_str());
        let _ = writeln!(out, "  FD_OPTIONS:      {}", self.fd_options.join(" "));
        let _ = writeln!(out, "  FIND_OPTIONS:    {}", self.find_options.join(" "));
        let _ = writeln!(out, "  SOPS_BINARY:     {}", self.sops_binary.display());
        let _ = writeln!(out, "  SOPS_OPTIONS:    {}", self.sops_options.join(" "));
        out
    }
}

fn split_words(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}
