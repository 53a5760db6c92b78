//! Helper process launching
//!
//! Key actions start external tools (launcher, terminal, volume and
//! brightness controls). Children are detached into their own session and
//! never waited for.

use anyhow::{Context, Result};
use nix::sys::signal::{SigHandler, Signal, signal};
use std::ffi::OsString;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info};

use crate::wm::error::{Rejection, WmError};

/// Characters a shell would interpret
const SHELL_METACHARACTERS: &[char] = &[
    ';', '&', '|', '$', '`', '<', '>', '(', ')', '{', '}', '*', '?', '!', '"', '\'', '\\', '\n',
];

/// Environment passed through to children; everything else is dropped
const PASSED_ENV: &[&str] = &[
    "PATH",
    "HOME",
    "USER",
    "LANG",
    "DISPLAY",
    "XAUTHORITY",
    "XDG_RUNTIME_DIR",
    "DBUS_SESSION_BUS_ADDRESS",
];

/// Reject empty commands and arguments carrying shell metacharacters
pub fn check_argv(argv: &[String]) -> Result<(), Rejection> {
    if argv.first().is_none_or(|program| program.is_empty()) {
        return Err(Rejection::EmptyCommand);
    }
    match argv.iter().find(|arg| arg.contains(SHELL_METACHARACTERS)) {
        Some(arg) => Err(Rejection::UnsafeArgument(arg.clone())),
        None => Ok(()),
    }
}

/// Let the kernel reap exited children
pub fn ignore_sigchld() -> Result<()> {
    // Safety: SigIgn installs no handler code
    unsafe { signal(Signal::SIGCHLD, SigHandler::SigIgn) }.context("Failed to ignore SIGCHLD")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct Spawner {
    home: Option<PathBuf>,
    search_path: Option<OsString>,
}

impl Spawner {
    pub fn new() -> Self {
        Self {
            home: dirs::home_dir(),
            search_path: std::env::var_os("PATH"),
        }
    }

    #[cfg(test)]
    pub fn with_environment(home: Option<PathBuf>, search_path: Option<OsString>) -> Self {
        Self { home, search_path }
    }

    /// Expand a leading `~/` against the home directory
    pub fn expand_home(&self, arg: &str) -> String {
        match (arg.strip_prefix("~/"), &self.home) {
            (Some(rest), Some(home)) => home.join(rest).to_string_lossy().into_owned(),
            _ => arg.to_string(),
        }
    }

    /// Absolute path of `program`, searching `PATH` when it has no slash
    pub fn resolve(&self, program: &str) -> Result<PathBuf, Rejection> {
        let not_found = || Rejection::CommandNotFound(program.to_string());
        if program.contains('/') {
            let path = PathBuf::from(program);
            return is_executable(&path).then_some(path).ok_or_else(not_found);
        }
        let search_path = self.search_path.as_ref().ok_or_else(not_found)?;
        std::env::split_paths(search_path)
            .map(|dir| dir.join(program))
            .find(|candidate| is_executable(candidate))
            .ok_or_else(not_found)
    }

    /// Validate `argv` and build the command without starting it
    pub fn prepare(&self, argv: &[String]) -> Result<Command, Rejection> {
        check_argv(argv)?;
        let argv: Vec<String> = argv.iter().map(|arg| self.expand_home(arg)).collect();
        let program = self.resolve(&argv[0])?;

        let mut command = Command::new(program);
        command
            .args(&argv[1..])
            .env_clear()
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        for key in PASSED_ENV {
            if let Some(value) = std::env::var_os(key) {
                command.env(key, value);
            }
        }
        Ok(command)
    }

    /// Start a detached child. Rejected commands surface as `WmError::Rejected`.
    pub fn spawn(&self, argv: &[String]) -> Result<()> {
        let mut command = self.prepare(argv).map_err(WmError::Rejected)?;
        // Safety: setsid is async-signal-safe
        unsafe {
            command.pre_exec(|| {
                nix::unistd::setsid()?;
                Ok(())
            });
        }
        let child = command
            .spawn()
            .with_context(|| format!("Failed to spawn {}", argv[0]))?;
        info!("Spawned {} (pid {})", argv[0], child.id());
        debug!("argv: {:?}", argv);
        Ok(())
    }
}

impl Default for Spawner {
    fn default() -> Self {
        Self::new()
    }
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
