//! Launch modes and generated command lines.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Launch mode offered by a server type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchMode {
    mode: String,
    desc: String,
}

impl LaunchMode {
    /// Tag of the plain run mode.
    pub const RUN: &'static str = "run";

    /// Tag of the debug mode.
    pub const DEBUG: &'static str = "debug";

    /// Creates a launch mode.
    #[must_use]
    pub fn new(mode: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            mode: mode.into(),
            desc: description.into(),
        }
    }

    /// The conventional `run` mode.
    #[must_use]
    pub fn run() -> Self {
        Self::new(Self::RUN, "A launch mode indicating a simple run.")
    }

    /// The conventional `debug` mode.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(
            Self::DEBUG,
            "A launch mode indicating a debug launch, which can add the appropriate debugging flags or system properties as required.",
        )
    }

    /// Returns the mode tag.
    #[must_use]
    pub fn mode(&self) -> &str {
        &self.mode
    }

    /// Returns the human-readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.desc
    }
}

/// Fully resolved command line for launching a server process.
///
/// Both the working directory and the command line are non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandLineDetails {
    working_dir: String,
    cmd_line: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    envp: BTreeMap<String, String>,
}

impl CommandLineDetails {
    /// Creates command line details.
    ///
    /// Returns `None` when the working directory or the command line is
    /// empty.
    #[must_use]
    pub fn new(working_dir: impl Into<String>, cmd_line: Vec<String>) -> Option<Self> {
        let directory = working_dir.into();
        let has_program = cmd_line.first().is_some_and(|program| !program.is_empty());
        if directory.trim().is_empty() || !has_program {
            return None;
        }
        Some(Self {
            working_dir: directory,
            cmd_line,
            envp: BTreeMap::new(),
        })
    }

    /// Adds environment variables for the launched process.
    #[must_use]
    pub fn with_environment(mut self, envp: BTreeMap<String, String>) -> Self {
        self.envp = envp;
        self
    }

    /// Returns the working directory.
    #[must_use]
    pub fn working_dir(&self) -> &str {
        &self.working_dir
    }

    /// Returns the full command line, program first.
    #[must_use]
    pub fn cmd_line(&self) -> &[String] {
        &self.cmd_line
    }

    /// Returns the program to execute.
    #[must_use]
    pub fn program(&self) -> &str {
        self.cmd_line.first().map_or("", String::as_str)
    }

    /// Returns the arguments after the program.
    #[must_use]
    pub fn args(&self) -> &[String] {
        self.cmd_line.get(1..).unwrap_or_default()
    }

    /// Returns extra environment variables.
    #[must_use]
    pub const fn environment(&self) -> &BTreeMap<String, String> {
        &self.envp
    }
}
