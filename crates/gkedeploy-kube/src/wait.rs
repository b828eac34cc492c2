//! Rollout and job waits
//!
//! Targets are waited on one at a time, in the order given, and the first
//! failure ends the wait.

use tracing::info;

use crate::error::Result;
use crate::kubectl::Kubectl;
use crate::runner::{CommandRunner, Invocation};

/// External program used to bound rollout waits
pub const TIMEOUT: &str = "timeout";

/// What is being waited for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// `rollout status`; unqualified names are deployments
    Rollout,
    /// `wait --for=condition=complete`; unqualified names are jobs
    Job,
}

impl TargetKind {
    fn default_resource(&self) -> &'static str {
        match self {
            TargetKind::Rollout => "deployment",
            TargetKind::Job => "job",
        }
    }

    fn noun(&self) -> &'static str {
        match self {
            TargetKind::Rollout => "rollout",
            TargetKind::Job => "job",
        }
    }
}

/// A single resource to wait on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolloutTarget {
    pub kind: TargetKind,
    /// `<type>/<name>`
    pub resource: String,
    pub namespace: Option<String>,
    /// 0 means no timeout for rollouts
    pub timeout_seconds: u64,
}

impl RolloutTarget {
    /// Build a target from a spec such as `app` or `statefulset/db`
    pub fn new(kind: TargetKind, spec: &str) -> Self {
        let spec = spec.trim();
        let resource = if spec.contains('/') {
            spec.to_string()
        } else {
            format!("{}/{}", kind.default_resource(), spec)
        };

        Self {
            kind,
            resource,
            namespace: None,
            timeout_seconds: 0,
        }
    }

    /// Limit the wait to the given namespace; empty means the context default
    pub fn namespace(mut self, namespace: &str) -> Self {
        self.namespace = (!namespace.is_empty()).then(|| namespace.to_string());
        self
    }

    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// The command that blocks until this target is ready
    pub fn invocation(&self, kubectl: &Kubectl) -> Invocation {
        let mut invocation = match self.kind {
            TargetKind::Rollout => kubectl
                .command()
                .args(["rollout", "status"])
                .arg(&self.resource),
            TargetKind::Job => kubectl
                .command()
                .args(["wait", "--for=condition=complete"])
                .arg(&self.resource)
                .arg(format!("--timeout={}s", self.timeout_seconds)),
        };

        if let Some(ns) = &self.namespace {
            invocation = invocation.args(["--namespace", ns.as_str()]);
        }

        match self.kind {
            TargetKind::Rollout if self.timeout_seconds > 0 => {
                invocation.wrapped(TIMEOUT, [self.timeout_seconds.to_string()])
            }
            _ => invocation,
        }
    }
}

fn targets(
    kind: TargetKind,
    specs: &[String],
    namespace: &str,
    seconds: u64,
) -> Vec<RolloutTarget> {
    specs
        .iter()
        .filter(|spec| !spec.trim().is_empty())
        .map(|spec| RolloutTarget::new(kind, spec).namespace(namespace).timeout(seconds))
        .collect()
}

fn wait_all<R: CommandRunner + ?Sized>(
    runner: &R,
    kubectl: &Kubectl,
    targets: &[RolloutTarget],
) -> Result<()> {
    let total = targets.len();

    for (i, target) in targets.iter().enumerate() {
        let progress = if total > 1 {
            format!(" {}/{}", i + 1, total)
        } else {
            String::new()
        };
        info!(
            "Waiting until {} completes for {}{}",
            target.kind.noun(),
            target.resource,
            progress
        );

        runner.run(target.invocation(kubectl))?;
    }

    Ok(())
}

/// Wait for each rollout to finish, bounded by `seconds` when positive
pub fn wait_for_rollouts<R: CommandRunner + ?Sized>(
    runner: &R,
    kubectl: &Kubectl,
    specs: &[String],
    namespace: &str,
    seconds: u64,
) -> Result<()> {
    wait_all(runner, kubectl, &targets(TargetKind::Rollout, specs, namespace, seconds))
}

/// Wait for each job to complete within `seconds`
pub fn wait_for_jobs<R: CommandRunner + ?Sized>(
    runner: &R,
    kubectl: &Kubectl,
    specs: &[String],
    namespace: &str,
    seconds: u64,
) -> Result<()> {
    wait_all(runner, kubectl, &targets(TargetKind::Job, specs, namespace, seconds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRunner;

    fn specs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_target_expansion() {
        assert_eq!(RolloutTarget::new(TargetKind::Rollout, "d1").resource, "deployment/d1");
        assert_eq!(
            RolloutTarget::new(TargetKind::Rollout, "statefulset/s1").resource,
            "statefulset/s1"
        );
        assert_eq!(RolloutTarget::new(TargetKind::Job, "migrate").resource, "job/migrate");
        assert_eq!(RolloutTarget::new(TargetKind::Job, " cronjob/x ").resource, "cronjob/x");
    }

    #[test]
    fn test_rollout_invocation() {
        let kubectl = Kubectl::default();

        let target = RolloutTarget::new(TargetKind::Rollout, "app");
        assert_eq!(
            target.invocation(&kubectl).command_line(),
            "kubectl rollout status deployment/app"
        );

        let target = target.namespace("prod").timeout(120);
        assert_eq!(
            target.invocation(&kubectl).command_line(),
            "timeout 120 kubectl rollout status deployment/app --namespace prod"
        );
    }

    #[test]
    fn test_job_invocation() {
        let target = RolloutTarget::new(TargetKind::Job, "migrate")
            .namespace("prod")
            .timeout(60);
        assert_eq!(
            target.invocation(&Kubectl::default()).command_line(),
            "kubectl wait --for=condition=complete job/migrate --timeout=60s --namespace prod"
        );
    }

    #[test]
    fn test_wait_for_rollouts_in_order() {
        let mock = MockRunner::new();
        wait_for_rollouts(
            &mock,
            &Kubectl::default(),
            &specs(&["d1", "statefulset/s1", ""]),
            "",
            0,
        )
        .unwrap();

        assert_eq!(
            mock.calls(),
            vec![
                "kubectl rollout status deployment/d1",
                "kubectl rollout status statefulset/s1",
            ]
        );
    }

    #[test]
    fn test_wait_stops_at_first_failure() {
        let mock = MockRunner::new().fail_on("timeout 30 kubectl rollout status deployment/d2");
        let result = wait_for_rollouts(
            &mock,
            &Kubectl::default(),
            &specs(&["d1", "d2", "d3"]),
            "ns",
            30,
        );

        assert!(result.is_err());
        assert_eq!(mock.calls().len(), 2);
    }

    #[test]
    fn test_wait_for_jobs() {
        let mock = MockRunner::new();
        wait_for_jobs(&mock, &Kubectl::new("kubectl.1.14"), &specs(&["j1"]), "", 60).unwrap();
        assert_eq!(
            mock.calls(),
            vec!["kubectl.1.14 wait --for=condition=complete job/j1 --timeout=60s"]
        );
    }

    #[test]
    fn test_nothing_to_wait_for() {
        let mock = MockRunner::new();
        wait_for_rollouts(&mock, &Kubectl::default(), &[], "ns", 30).unwrap();
        wait_for_jobs(&mock, &Kubectl::default(), &[], "ns", 30).unwrap();
        assert!(mock.calls().is_empty());
    }
}
