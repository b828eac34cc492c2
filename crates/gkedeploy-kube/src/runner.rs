//! Process runner seam
//!
//! Every gcloud and kubectl call goes through [`CommandRunner`], so the
//! pipeline can be driven against [`MockRunner`](crate::MockRunner) in tests.

use std::fmt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};

use console::style;

use crate::error::{KubeError, Result};

/// Where a child's output stream goes
#[derive(Debug, Clone, Default)]
pub enum Sink {
    /// Shared with this process
    #[default]
    Inherit,
    /// Captured into a buffer
    Buffer(OutputBuffer),
}

/// A captured output stream, shared between the caller and the runner
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer(Arc<Mutex<Vec<u8>>>);

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn write(&self, bytes: &[u8]) {
        self.lock().extend_from_slice(bytes);
    }

    /// Everything captured so far, lossily decoded
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.lock()).into_owned()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// The last line of captured output
    pub fn last_line(&self) -> Option<String> {
        self.contents()
            .lines()
            .map(str::trim_end)
            .rfind(|line| !line.is_empty())
            .map(str::to_string)
    }
}

/// One external command: program, arguments and output routing
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub stdout: Sink,
    pub stderr: Sink,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdout: Sink::Inherit,
            stderr: Sink::Inherit,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdout(mut self, sink: Sink) -> Self {
        self.stdout = sink;
        self
    }

    pub fn stderr(mut self, sink: Sink) -> Self {
        self.stderr = sink;
        self
    }

    /// Prepend a wrapper program, e.g. `timeout 30 kubectl ...`
    pub fn wrapped<I, S>(self, program: impl Into<String>, wrapper_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args: Vec<String> = wrapper_args.into_iter().map(Into::into).collect();
        args.push(self.program);
        args.extend(self.args);

        Self {
            program: program.into(),
            args,
            stdout: self.stdout,
            stderr: self.stderr,
        }
    }

    /// `program arg1 arg2 ...`
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// Runs external commands to completion
pub trait CommandRunner {
    /// Run the command and wait for it; a non-zero exit is an error
    fn run(&self, invocation: Invocation) -> Result<()>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(&self, invocation: Invocation) -> Result<()> {
        (**self).run(invocation)
    }
}

/// Runs commands as real child processes
///
/// Children inherit this process's environment plus any variables added with
/// [`ProcessRunner::env`].
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    env: Vec<(String, String)>,
    current_dir: Option<PathBuf>,
    echo: bool,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self {
            echo: true,
            ..Self::default()
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Print `$ command` before each run (on by default)
    pub fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }
}

fn stdio(sink: &Sink) -> Stdio {
    match sink {
        Sink::Inherit => Stdio::inherit(),
        Sink::Buffer(_) => Stdio::piped(),
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, invocation: Invocation) -> Result<()> {
        if self.echo {
            println!("{} {}", style("$").dim(), style(invocation.command_line()).bold());
        }

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(stdio(&invocation.stdout))
            .stderr(stdio(&invocation.stderr));

        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }

        let output = cmd.output().map_err(|source| KubeError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;

        if let Sink::Buffer(buffer) = &invocation.stdout {
            buffer.write(&output.stdout);
        }
        if let Sink::Buffer(buffer) = &invocation.stderr {
            buffer.write(&output.stderr);
        }

        if output.status.success() {
            Ok(())
        } else {
            Err(KubeError::CommandFailed {
                command: invocation.command_line(),
                status: output.status.to_string(),
            })
        }
    }
}
