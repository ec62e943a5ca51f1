//! End-to-end swap scenarios against in-memory fakes of the
//! container runtime, proxy, probe, and notifier seams.
//!
//! Time-dependent polling runs under a paused tokio clock, so the
//! production-shaped retry budgets execute instantly.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use cutover_core::{CutoverConfig, DeploymentRequest, EnvSettings, Slot};
use cutover_health::{Probe, ProbeResult};
use cutover_notify::{Notifier, NotifyError};
use cutover_proxy::{ProxyController, ProxyError, RoutingConfig, RoutingSnapshot};
use cutover_runtime::{ContainerRuntime, RunSpec, RuntimeError};
use cutover_swap::{Swap, SwapError, SwapPhase};

// ── Fakes ─────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeRuntime {
    running: Mutex<BTreeSet<String>>,
    pulled: Mutex<Vec<String>>,
    removed: Mutex<Vec<String>>,
    logins: AtomicU32,
    fail_login: bool,
    missing_image: bool,
    fail_run: bool,
    instance_logs: String,
}

impl FakeRuntime {
    fn with_running(names: &[&str]) -> Self {
        let runtime = Self::default();
        {
            let mut running = runtime.running.lock().unwrap();
            for name in names {
                running.insert(name.to_string());
            }
        }
        runtime
    }

    fn running_now(&self) -> Vec<String> {
        self.running.lock().unwrap().iter().cloned().collect()
    }

    fn pull_count(&self) -> usize {
        self.pulled.lock().unwrap().len()
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list_running(&self, names: &[String]) -> Result<Vec<String>, RuntimeError> {
        let running = self.running.lock().unwrap();
        Ok(names
            .iter()
            .filter(|name| running.contains(*name))
            .cloned()
            .collect())
    }

    async fn login(&self, registry: &str, _: &str, _: &str) -> Result<(), RuntimeError> {
        if self.fail_login {
            return Err(RuntimeError::Auth {
                registry: registry.to_string(),
                reason: "invalid credentials".to_string(),
            });
        }
        self.logins.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn pull(&self, image: &str) -> Result<(), RuntimeError> {
        if self.missing_image {
            return Err(RuntimeError::ImageNotFound {
                image: image.to_string(),
                reason: "manifest unknown".to_string(),
            });
        }
        self.pulled.lock().unwrap().push(image.to_string());
        Ok(())
    }

    async fn run(&self, spec: &RunSpec) -> Result<(), RuntimeError> {
        if self.fail_run {
            return Err(RuntimeError::StartFailed {
                name: spec.name.clone(),
                reason: "port already bound".to_string(),
            });
        }
        self.running.lock().unwrap().insert(spec.name.clone());
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<(), RuntimeError> {
        self.running.lock().unwrap().remove(name);
        self.removed.lock().unwrap().push(name.to_string());
        Ok(())
    }

    async fn logs(&self, _: &str, _: u32) -> Result<String, RuntimeError> {
        Ok(self.instance_logs.clone())
    }
}

#[derive(Default)]
struct FakeProxy {
    live: Mutex<Option<String>>,
    reloads: AtomicU32,
    reject_validation: bool,
    fail_restore: bool,
}

impl FakeProxy {
    fn with_live(text: &str) -> Self {
        Self {
            live: Mutex::new(Some(text.to_string())),
            ..Self::default()
        }
    }

    fn live_text(&self) -> Option<String> {
        self.live.lock().unwrap().clone()
    }

    fn reload_count(&self) -> u32 {
        self.reloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProxyController for FakeProxy {
    async fn validate(&self, _: &RoutingConfig) -> Result<(), ProxyError> {
        if self.reject_validation {
            Err(ProxyError::Validation(
                "unexpected token on line 3".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    async fn apply(&self, config: &RoutingConfig) -> Result<RoutingSnapshot, ProxyError> {
        let mut live = self.live.lock().unwrap();
        let prior = live.clone();
        *live = Some(config.text().to_string());
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(RoutingSnapshot { prior })
    }

    async fn restore(&self, snapshot: &RoutingSnapshot) -> Result<(), ProxyError> {
        if self.fail_restore {
            return Err(ProxyError::Reload("reload refused".to_string()));
        }
        *self.live.lock().unwrap() = snapshot.prior.clone();
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn live_config(&self) -> Result<Option<String>, ProxyError> {
        Ok(self.live_text())
    }
}

/// Probe whose answers are keyed by port: an optional scripted queue
/// first, then a per-port default.
#[derive(Default)]
struct ScriptedProbe {
    scripted: Mutex<HashMap<u16, VecDeque<ProbeResult>>>,
    healthy_ports: BTreeSet<u16>,
}

impl ScriptedProbe {
    fn healthy_on(ports: &[u16]) -> Self {
        Self {
            scripted: Mutex::new(HashMap::new()),
            healthy_ports: ports.iter().copied().collect(),
        }
    }

    fn script(self, port: u16, results: &[ProbeResult]) -> Self {
        self.scripted
            .lock()
            .unwrap()
            .insert(port, results.iter().copied().collect());
        self
    }
}

#[async_trait]
impl Probe for ScriptedProbe {
    async fn check(&self, address: &str, _path: &str) -> ProbeResult {
        let port: u16 = address
            .rsplit(':')
            .next()
            .and_then(|p| p.parse().ok())
            .expect("probe addresses are host:port");
        if let Some(queue) = self.scripted.lock().unwrap().get_mut(&port) {
            if let Some(result) = queue.pop_front() {
                return result;
            }
        }
        if self.healthy_ports.contains(&port) {
            ProbeResult::Healthy
        } else {
            ProbeResult::Unhealthy
        }
    }
}

#[derive(Default)]
struct RecordingNotifier {
    messages: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    fn subjects(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|(subject, _)| subject.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn publish(&self, subject: &str, message: &str) -> Result<(), NotifyError> {
        self.messages
            .lock()
            .unwrap()
            .push((subject.to_string(), message.to_string()));
        Ok(())
    }
}

// ── Harness ───────────────────────────────────────────────────────

const TARGET_B_PORT: u16 = 9002;
const TARGET_A_PORT: u16 = 9001;
const PROXY_PORT: u16 = 8080;

fn test_config() -> CutoverConfig {
    let mut config = CutoverConfig::default();
    config.health.warmup_secs = 2;
    config.health.attempts = 3;
    config.health.interval_secs = 1;
    config.monitor.confirm_attempts = 2;
    config.monitor.confirm_interval_secs = 1;
    config.monitor.soak_secs = 5;
    config.deadline_secs = 300;
    config
}

struct Fixture {
    runtime: Arc<FakeRuntime>,
    proxy: Arc<FakeProxy>,
    notifier: Arc<RecordingNotifier>,
    swap: Swap,
}

fn fixture(runtime: FakeRuntime, proxy: FakeProxy, probe: ScriptedProbe) -> Fixture {
    fixture_with_config(test_config(), runtime, proxy, probe)
}

fn fixture_with_config(
    config: CutoverConfig,
    runtime: FakeRuntime,
    proxy: FakeProxy,
    probe: ScriptedProbe,
) -> Fixture {
    let runtime = Arc::new(runtime);
    let proxy = Arc::new(proxy);
    let notifier = Arc::new(RecordingNotifier::default());
    let swap = Swap::new(
        config,
        EnvSettings::default(),
        runtime.clone(),
        proxy.clone(),
        Arc::new(probe),
        notifier.clone(),
    );
    Fixture {
        runtime,
        proxy,
        notifier,
        swap,
    }
}

// ── Scenarios ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn happy_path_swaps_a_to_b() {
    let f = fixture(
        FakeRuntime::with_running(&["inference-a"]),
        FakeProxy::with_live("routing to a"),
        ScriptedProbe::healthy_on(&[TARGET_B_PORT, PROXY_PORT]),
    );

    let outcome = f.swap.run(&DeploymentRequest::new("v2")).await.unwrap();

    assert!(outcome.is_success());
    assert_eq!(outcome.active_after, Some(Slot::B));
    // Exactly one slot instance is running afterwards.
    assert_eq!(f.runtime.running_now(), vec!["inference-b"]);
    // Routing now targets slot b's port.
    assert!(f.proxy.live_text().unwrap().contains("127.0.0.1:9002"));
    // One reload for the switch, none for rollback.
    assert_eq!(f.proxy.reload_count(), 1);
    assert_eq!(f.notifier.subjects(), vec!["cutover succeeded"]);
}

#[tokio::test(start_paused = true)]
async fn happy_path_swaps_b_to_a() {
    let f = fixture(
        FakeRuntime::with_running(&["inference-b"]),
        FakeProxy::with_live("routing to b"),
        ScriptedProbe::healthy_on(&[TARGET_A_PORT, PROXY_PORT]),
    );

    let outcome = f.swap.run(&DeploymentRequest::new("v2")).await.unwrap();

    assert_eq!(outcome.active_after, Some(Slot::A));
    assert_eq!(f.runtime.running_now(), vec!["inference-a"]);
    assert!(f.proxy.live_text().unwrap().contains("127.0.0.1:9001"));
}

#[tokio::test(start_paused = true)]
async fn health_gate_exhaustion_leaves_routing_untouched() {
    let runtime = FakeRuntime {
        instance_logs: "Traceback: model file missing".to_string(),
        ..FakeRuntime::with_running(&["inference-a"])
    };
    let f = fixture(
        runtime,
        FakeProxy::with_live("routing to a"),
        // Target port never reports healthy.
        ScriptedProbe::healthy_on(&[PROXY_PORT]),
    );

    let failure = f.swap.run(&DeploymentRequest::new("v2")).await.unwrap_err();

    assert_eq!(failure.phase, SwapPhase::HealthChecking);
    assert!(matches!(
        failure.error,
        SwapError::HealthCheckTimeout { attempts: 3 }
    ));
    // Live routing is bit-identical to its pre-run value and the
    // reload interface was never invoked.
    assert_eq!(f.proxy.live_text().as_deref(), Some("routing to a"));
    assert_eq!(f.proxy.reload_count(), 0);
    // Target torn down, active slot untouched.
    assert_eq!(f.runtime.running_now(), vec!["inference-a"]);
    // The failed instance's logs were captured for diagnostics.
    assert_eq!(
        failure.diagnostics.as_deref(),
        Some("Traceback: model file missing")
    );
    assert_eq!(f.notifier.subjects(), vec!["cutover failed"]);
}

#[tokio::test(start_paused = true)]
async fn validation_failure_never_reloads() {
    let proxy = FakeProxy {
        reject_validation: true,
        ..FakeProxy::with_live("routing to a")
    };
    let f = fixture(
        FakeRuntime::with_running(&["inference-a"]),
        proxy,
        ScriptedProbe::healthy_on(&[TARGET_B_PORT, PROXY_PORT]),
    );

    let failure = f.swap.run(&DeploymentRequest::new("v2")).await.unwrap_err();

    assert_eq!(failure.phase, SwapPhase::Switching);
    assert!(matches!(failure.error, SwapError::RoutingValidation(_)));
    assert_eq!(f.proxy.reload_count(), 0);
    assert_eq!(f.proxy.live_text().as_deref(), Some("routing to a"));
    assert_eq!(f.runtime.running_now(), vec!["inference-a"]);
}

#[tokio::test(start_paused = true)]
async fn post_switch_regression_restores_snapshot() {
    let f = fixture(
        FakeRuntime::with_running(&["inference-a"]),
        FakeProxy::with_live("pre-switch bytes"),
        // Direct target port healthy, live route never healthy.
        ScriptedProbe::healthy_on(&[TARGET_B_PORT]),
    );

    let failure = f.swap.run(&DeploymentRequest::new("v2")).await.unwrap_err();

    assert_eq!(failure.phase, SwapPhase::Monitoring);
    assert!(matches!(failure.error, SwapError::PostSwitchHealth(_)));
    // Routing byte-equal to the pre-switch snapshot.
    assert_eq!(f.proxy.live_text().as_deref(), Some("pre-switch bytes"));
    // One reload to switch, one to revert.
    assert_eq!(f.proxy.reload_count(), 2);
    // Previously-active instance still running, target gone.
    assert_eq!(f.runtime.running_now(), vec!["inference-a"]);
}

#[tokio::test(start_paused = true)]
async fn final_verification_failure_rolls_back() {
    let probe = ScriptedProbe::healthy_on(&[TARGET_B_PORT]).script(
        PROXY_PORT,
        // Post-switch confirmation passes once, then the service
        // regresses during the soak.
        &[ProbeResult::Healthy, ProbeResult::Unhealthy],
    );
    let f = fixture(
        FakeRuntime::with_running(&["inference-a"]),
        FakeProxy::with_live("pre-switch bytes"),
        probe,
    );

    let failure = f.swap.run(&DeploymentRequest::new("v2")).await.unwrap_err();

    assert_eq!(failure.phase, SwapPhase::Monitoring);
    assert!(matches!(failure.error, SwapError::FinalVerification(_)));
    assert_eq!(f.proxy.live_text().as_deref(), Some("pre-switch bytes"));
    assert_eq!(f.runtime.running_now(), vec!["inference-a"]);
}

#[tokio::test(start_paused = true)]
async fn repeated_runs_toggle_the_active_slot() {
    let f = fixture(
        FakeRuntime::with_running(&["inference-a"]),
        FakeProxy::with_live("routing to a"),
        ScriptedProbe::healthy_on(&[TARGET_A_PORT, TARGET_B_PORT, PROXY_PORT]),
    );

    let first = f.swap.run(&DeploymentRequest::new("v2")).await.unwrap();
    assert_eq!(first.active_after, Some(Slot::B));
    assert_eq!(f.runtime.running_now(), vec!["inference-b"]);

    let second = f.swap.run(&DeploymentRequest::new("v2")).await.unwrap();
    assert_eq!(second.active_after, Some(Slot::A));
    // Never two instances claiming active.
    assert_eq!(f.runtime.running_now(), vec!["inference-a"]);
}

#[tokio::test(start_paused = true)]
async fn no_running_slot_is_ambiguous() {
    let f = fixture(
        FakeRuntime::default(),
        FakeProxy::default(),
        ScriptedProbe::default(),
    );

    let failure = f.swap.run(&DeploymentRequest::new("v2")).await.unwrap_err();

    assert_eq!(failure.phase, SwapPhase::Resolving);
    assert!(matches!(failure.error, SwapError::AmbiguousState(_)));
    // The orchestrator must not guess: nothing was pulled or touched.
    assert_eq!(f.runtime.pull_count(), 0);
    assert_eq!(f.proxy.reload_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn both_slots_running_is_ambiguous() {
    let f = fixture(
        FakeRuntime::with_running(&["inference-a", "inference-b"]),
        FakeProxy::default(),
        ScriptedProbe::default(),
    );

    let failure = f.swap.run(&DeploymentRequest::new("v2")).await.unwrap_err();
    assert!(matches!(failure.error, SwapError::AmbiguousState(_)));
    // Both instances left exactly as found.
    assert_eq!(
        f.runtime.running_now(),
        vec!["inference-a", "inference-b"]
    );
}

#[tokio::test(start_paused = true)]
async fn missing_artifact_aborts_before_any_mutation() {
    let runtime = FakeRuntime {
        missing_image: true,
        ..FakeRuntime::with_running(&["inference-a"])
    };
    let f = fixture(runtime, FakeProxy::with_live("routing to a"), ScriptedProbe::default());

    let failure = f.swap.run(&DeploymentRequest::new("v9")).await.unwrap_err();

    assert_eq!(failure.phase, SwapPhase::Fetching);
    assert!(matches!(failure.error, SwapError::ArtifactNotFound(_)));
    assert_eq!(f.runtime.running_now(), vec!["inference-a"]);
    assert!(f.runtime.removed.lock().unwrap().is_empty());
    assert_eq!(f.proxy.reload_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn login_failure_is_authentication_error() {
    let runtime = FakeRuntime {
        fail_login: true,
        ..FakeRuntime::with_running(&["inference-a"])
    };
    let mut env = EnvSettings::default();
    env.registry = Some("registry.example".to_string());
    env.registry_user = Some("deployer".to_string());
    env.registry_password = Some("secret".to_string());

    let runtime = Arc::new(runtime);
    let proxy = Arc::new(FakeProxy::with_live("routing to a"));
    let notifier = Arc::new(RecordingNotifier::default());
    let swap = Swap::new(
        test_config(),
        env,
        runtime.clone(),
        proxy.clone(),
        Arc::new(ScriptedProbe::default()),
        notifier.clone(),
    );

    let failure = swap.run(&DeploymentRequest::new("v2")).await.unwrap_err();

    assert_eq!(failure.phase, SwapPhase::Fetching);
    assert!(matches!(failure.error, SwapError::Authentication(_)));
    assert_eq!(runtime.logins.load(Ordering::SeqCst), 0);
    assert_eq!(runtime.pull_count(), 0);
    assert_eq!(runtime.running_now(), vec!["inference-a"]);
}

#[tokio::test(start_paused = true)]
async fn launch_failure_cleans_up_target() {
    let runtime = FakeRuntime {
        fail_run: true,
        ..FakeRuntime::with_running(&["inference-a"])
    };
    let f = fixture(
        runtime,
        FakeProxy::with_live("routing to a"),
        ScriptedProbe::default(),
    );

    let failure = f.swap.run(&DeploymentRequest::new("v2")).await.unwrap_err();

    assert_eq!(failure.phase, SwapPhase::Launching);
    assert!(matches!(failure.error, SwapError::Launch(_)));
    // Stale cleanup plus the compensating removal both targeted b.
    assert_eq!(
        *f.runtime.removed.lock().unwrap(),
        vec!["inference-b", "inference-b"]
    );
    assert_eq!(f.runtime.running_now(), vec!["inference-a"]);
    assert_eq!(f.proxy.reload_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_rollback_is_surfaced_for_operators() {
    let proxy = FakeProxy {
        fail_restore: true,
        ..FakeProxy::with_live("pre-switch bytes")
    };
    let f = fixture(
        FakeRuntime::with_running(&["inference-a"]),
        proxy,
        // Forces the post-switch failure that triggers the rollback.
        ScriptedProbe::healthy_on(&[TARGET_B_PORT]),
    );

    let failure = f.swap.run(&DeploymentRequest::new("v2")).await.unwrap_err();

    assert_eq!(failure.phase, SwapPhase::RollingBack);
    assert!(matches!(failure.error, SwapError::RollbackFailed(_)));
    assert_eq!(
        f.notifier.subjects(),
        vec!["cutover rollback failed: manual intervention required"]
    );
}

#[tokio::test(start_paused = true)]
async fn deadline_unwinds_in_flight_work() {
    let mut config = test_config();
    config.deadline_secs = 1;
    // Warm-up alone exceeds the deadline, so the run dies inside the
    // health gate with the target instance already launched.
    config.health.warmup_secs = 30;

    let f = fixture_with_config(
        config,
        FakeRuntime::with_running(&["inference-a"]),
        FakeProxy::with_live("routing to a"),
        ScriptedProbe::healthy_on(&[TARGET_B_PORT, PROXY_PORT]),
    );

    let failure = f.swap.run(&DeploymentRequest::new("v2")).await.unwrap_err();

    assert!(matches!(failure.error, SwapError::DeadlineExceeded(1)));
    // The launched target was removed, the active slot untouched.
    assert_eq!(f.runtime.running_now(), vec!["inference-a"]);
    assert_eq!(f.proxy.live_text().as_deref(), Some("routing to a"));
    assert_eq!(f.proxy.reload_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn exactly_one_active_slot_after_any_outcome() {
    // Success case.
    let ok = fixture(
        FakeRuntime::with_running(&["inference-a"]),
        FakeProxy::with_live("routing to a"),
        ScriptedProbe::healthy_on(&[TARGET_B_PORT, PROXY_PORT]),
    );
    ok.swap.run(&DeploymentRequest::new("v2")).await.unwrap();
    assert_eq!(ok.runtime.running_now().len(), 1);

    // Rolled-back failure case.
    let failed = fixture(
        FakeRuntime::with_running(&["inference-a"]),
        FakeProxy::with_live("routing to a"),
        ScriptedProbe::healthy_on(&[]),
    );
    failed.swap.run(&DeploymentRequest::new("v2")).await.unwrap_err();
    assert_eq!(failed.runtime.running_now().len(), 1);
}
