//! Mock command runner for testing
//!
//! Records every command line instead of spawning a process, and can be
//! scripted to print output or fail for commands matching a prefix.

use std::sync::{Arc, RwLock};

use crate::error::{KubeError, Result};
use crate::runner::{CommandRunner, Invocation, Sink};

/// Exit status reported for scripted failures
pub const MOCK_FAILURE_STATUS: &str = "exit status: 1";

#[derive(Debug, Clone)]
struct Script {
    prefix: String,
    stdout: String,
    stderr: String,
    fail: bool,
}

/// In-memory command runner for testing
#[derive(Clone, Default)]
pub struct MockRunner {
    /// Command lines, in the order they were run
    calls: Arc<RwLock<Vec<String>>>,
    scripts: Arc<RwLock<Vec<Script>>>,
}

impl MockRunner {
    /// Create a runner where every command succeeds silently
    pub fn new() -> Self {
        Self::default()
    }

    fn script(self, prefix: &str, stdout: &str, stderr: &str, fail: bool) -> Self {
        self.scripts.write().unwrap().push(Script {
            prefix: prefix.to_string(),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            fail,
        });
        self
    }

    /// Print `stdout` for commands starting with `prefix`
    pub fn respond(self, prefix: &str, stdout: &str) -> Self {
        self.script(prefix, stdout, "", false)
    }

    /// Fail commands starting with `prefix`
    pub fn fail_on(self, prefix: &str) -> Self {
        self.script(prefix, "", "", true)
    }

    /// Fail commands starting with `prefix`, writing `stderr` first
    pub fn fail_with_stderr(self, prefix: &str, stderr: &str) -> Self {
        self.script(prefix, "", stderr, true)
    }

    /// Command lines run so far
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }

    /// Number of commands run starting with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }
}

impl CommandRunner for MockRunner {
    fn run(&self, invocation: Invocation) -> Result<()> {
        let command = invocation.command_line();
        self.calls.write().unwrap().push(command.clone());

        let scripts = self.scripts.read().unwrap();
        let Some(script) = scripts.iter().find(|s| command.starts_with(&s.prefix)) else {
            return Ok(());
        };

        if let Sink::Buffer(buffer) = &invocation.stdout {
            buffer.write(script.stdout.as_bytes());
        }
        if let Sink::Buffer(buffer) = &invocation.stderr {
            buffer.write(script.stderr.as_bytes());
        }

        if script.fail {
            Err(KubeError::CommandFailed {
                command,
                status: MOCK_FAILURE_STATUS.to_string(),
            })
        } else {
            Ok(())
        }
    }
}
