//! kubectl program handle and capability probe
//!
//! The dry-run flag syntax changed in kubectl 1.18, so the client version is
//! probed once per run and classified into a [`DryRunFlag`]. A probe that
//! fails or returns something unparseable falls back to the pre-1.18
//! client-side flag and never aborts the run.

use std::fmt;
use std::path::Path;

use gkedeploy_core::KUBECTL;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::runner::{CommandRunner, Invocation, OutputBuffer, Sink};

/// The kubectl program to run, e.g. `kubectl` or `kubectl.1.14`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kubectl {
    program: String,
}

impl Default for Kubectl {
    fn default() -> Self {
        Self::new(KUBECTL)
    }
}

impl Kubectl {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Start an invocation of this kubectl
    pub fn command(&self) -> Invocation {
        Invocation::new(&self.program)
    }
}

/// Client version as reported by `kubectl version`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct KubectlVersion {
    pub major: u32,
    pub minor: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionOutput {
    client_version: VersionInfo,
}

#[derive(Deserialize)]
struct VersionInfo {
    #[serde(default)]
    major: String,
    minor: String,
}

/// Leading decimal digits of `s`, so `"17+"` reads as 17
fn leading_number(s: &str) -> Option<u32> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s[..end].parse().ok()
}

impl KubectlVersion {
    /// Parse the JSON printed by `kubectl version --client -o=json`
    pub fn from_json(json: &str) -> Option<Self> {
        let output: VersionOutput = serde_json::from_str(json).ok()?;
        let minor = leading_number(&output.client_version.minor)?;
        let major = leading_number(&output.client_version.major).unwrap_or(1);
        Some(Self { major, minor })
    }

    /// Whether this client understands `--dry-run=<strategy>`
    pub fn has_dry_run_strategies(&self) -> bool {
        self.major > 1 || self.minor >= 18
    }
}

impl fmt::Display for KubectlVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// The dry-run flag understood by the probed client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DryRunFlag {
    /// `--dry-run`, before 1.18
    #[default]
    LegacyClient,
    /// `--server-dry-run`, before 1.18
    LegacyServer,
    /// `--dry-run=client`
    Client,
    /// `--dry-run=server`
    Server,
}

impl DryRunFlag {
    /// Select the flag for a client version; unknown versions get the legacy client flag
    pub fn select(version: Option<KubectlVersion>, server_side: bool) -> Self {
        match version {
            Some(v) if v.has_dry_run_strategies() => {
                if server_side {
                    DryRunFlag::Server
                } else {
                    DryRunFlag::Client
                }
            }
            Some(_) if server_side => DryRunFlag::LegacyServer,
            _ => DryRunFlag::LegacyClient,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DryRunFlag::LegacyClient => "--dry-run",
            DryRunFlag::LegacyServer => "--server-dry-run",
            DryRunFlag::Client => "--dry-run=client",
            DryRunFlag::Server => "--dry-run=server",
        }
    }
}

impl fmt::Display for DryRunFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Probe the client version and select the dry-run flag
pub fn probe<R: CommandRunner + ?Sized>(
    runner: &R,
    kubectl: &Kubectl,
    server_side: bool,
) -> DryRunFlag {
    let stdout = OutputBuffer::new();
    let invocation = kubectl
        .command()
        .args(["version", "--client", "-o=json"])
        .stdout(Sink::Buffer(stdout.clone()));

    let version = match runner.run(invocation) {
        Ok(()) => KubectlVersion::from_json(&stdout.contents()),
        Err(e) => {
            warn!("kubectl version probe failed: {}", e);
            None
        }
    };

    let flag = DryRunFlag::select(version, server_side);
    match version {
        Some(v) => info!("kubectl client version {}, dry-run flag {}", v, flag),
        None => {
            debug!("unparseable kubectl version output: {:?}", stdout.contents());
            warn!("could not determine kubectl client version, using {}", flag);
        }
    }
    flag
}

/// How one `kubectl apply` call should treat the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    /// Client-side apply
    Apply,
    /// Server-side apply
    ServerSide,
    /// Validate only
    DryRun(DryRunFlag),
}

impl ApplyMode {
    /// The mode for a persisting apply
    pub fn persist(server_side: bool) -> Self {
        if server_side {
            ApplyMode::ServerSide
        } else {
            ApplyMode::Apply
        }
    }

    /// The mode for the run's own apply: validate only when the whole run is a dry run
    pub fn for_run(dry_run: bool, flag: DryRunFlag, server_side: bool) -> Self {
        if dry_run {
            ApplyMode::DryRun(flag)
        } else {
            Self::persist(server_side)
        }
    }

    /// `apply [--dry-run=<variant> | --server-side] --filename <path>`
    pub fn args(&self, file: &Path) -> Vec<String> {
        let mut args = vec!["apply".to_string()];
        match self {
            ApplyMode::Apply => {}
            ApplyMode::ServerSide => args.push("--server-side".to_string()),
            ApplyMode::DryRun(flag) => args.push(flag.as_str().to_string()),
        }
        args.push("--filename".to_string());
        args.push(file.to_string_lossy().into_owned());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRunner;

    fn version(minor: u32) -> Option<KubectlVersion> {
        Some(KubectlVersion { major: 1, minor })
    }

    #[test]
    fn test_parse_version_json() {
        let json = r#"{"clientVersion": {"major": "1", "minor": "17+", "gitVersion": "v1.17.9"}}"#;
        assert_eq!(
            KubectlVersion::from_json(json),
            Some(KubectlVersion { major: 1, minor: 17 })
        );

        let json = r#"{"clientVersion": {"major": "1", "minor": "28"}, "kustomizeVersion": "v5"}"#;
        assert_eq!(KubectlVersion::from_json(json).unwrap().minor, 28);
    }

    #[test]
    fn test_parse_version_garbage() {
        assert_eq!(KubectlVersion::from_json(""), None);
        assert_eq!(KubectlVersion::from_json("Client Version: v1.28.2"), None);
        assert_eq!(
            KubectlVersion::from_json(r#"{"clientVersion": {"minor": "x"}}"#),
            None
        );
    }

    #[test]
    fn test_dry_run_flag_table() {
        assert_eq!(DryRunFlag::select(version(17), false).as_str(), "--dry-run");
        assert_eq!(DryRunFlag::select(version(17), true).as_str(), "--server-dry-run");
        assert_eq!(DryRunFlag::select(version(18), false).as_str(), "--dry-run=client");
        assert_eq!(DryRunFlag::select(version(18), true).as_str(), "--dry-run=server");
        assert_eq!(DryRunFlag::select(version(30), true), DryRunFlag::Server);
    }

    #[test]
    fn test_dry_run_flag_unknown_version() {
        assert_eq!(DryRunFlag::select(None, false), DryRunFlag::LegacyClient);
        assert_eq!(DryRunFlag::select(None, true), DryRunFlag::LegacyClient);
    }

    #[test]
    fn test_probe() {
        let mock = MockRunner::new().respond(
            "kubectl version",
            r#"{"clientVersion": {"major": "1", "minor": "21"}}"#,
        );
        let flag = probe(&mock, &Kubectl::default(), true);
        assert_eq!(flag, DryRunFlag::Server);
        assert_eq!(mock.calls(), vec!["kubectl version --client -o=json"]);
    }

    #[test]
    fn test_probe_falls_back() {
        let mock = MockRunner::new().respond("kubectl version", "not json");
        assert_eq!(probe(&mock, &Kubectl::default(), false), DryRunFlag::LegacyClient);

        let mock = MockRunner::new().fail_on("kubectl.1.14 version");
        assert_eq!(
            probe(&mock, &Kubectl::new("kubectl.1.14"), true),
            DryRunFlag::LegacyClient
        );
    }

    #[test]
    fn test_apply_args() {
        let file = Path::new("/tmp/.kube.yml");
        assert_eq!(
            ApplyMode::Apply.args(file),
            vec!["apply", "--filename", "/tmp/.kube.yml"]
        );
        assert_eq!(
            ApplyMode::persist(true).args(file),
            vec!["apply", "--server-side", "--filename", "/tmp/.kube.yml"]
        );
        assert_eq!(
            ApplyMode::DryRun(DryRunFlag::Client).args(file),
            vec!["apply", "--dry-run=client", "--filename", "/tmp/.kube.yml"]
        );
    }
}
