//! The swap pipeline.
//!
//! One `run()` call drives a full deployment:
//!
//! ```text
//! Resolving → Fetching → Launching → HealthChecking → Switching
//!     → Monitoring → {Finalizing | RollingBack} → Notifying → Done
//! ```
//!
//! Stages are hard gates executed strictly in order. The fetch runs
//! and succeeds before any environment is touched; the old slot is
//! never torn down before the new one passes the post-soak
//! confirmation. The whole run sits under a configurable wall-clock
//! deadline; hitting it unwinds the compensation stack like any
//! other failure.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};

use cutover_core::{CutoverConfig, DeploymentOutcome, DeploymentRequest, EnvSettings, Slot};
use cutover_health::{retry, Probe, RetryPolicy};
use cutover_notify::Notifier;
use cutover_proxy::{ProxyController, ProxyError, RoutingConfig, RoutingSpec};
use cutover_runtime::{ContainerRuntime, RunSpec, RuntimeError};

use crate::compensation::{Compensation, CompensationStack};
use crate::error::{SwapError, SwapFailure};
use crate::phase::SwapPhase;
use crate::resolver;

/// Mutable bookkeeping for one run, shared between the pipeline and
/// the failure path.
struct RunState {
    phase: SwapPhase,
    stack: CompensationStack,
    active: Option<Slot>,
    target: Option<Slot>,
}

impl RunState {
    fn new() -> Self {
        Self {
            phase: SwapPhase::Resolving,
            stack: CompensationStack::new(),
            active: None,
            target: None,
        }
    }
}

/// The blue/green swap orchestrator.
pub struct Swap {
    config: CutoverConfig,
    env: EnvSettings,
    runtime: Arc<dyn ContainerRuntime>,
    proxy: Arc<dyn ProxyController>,
    probe: Arc<dyn Probe>,
    notifier: Arc<dyn Notifier>,
}

impl Swap {
    pub fn new(
        config: CutoverConfig,
        env: EnvSettings,
        runtime: Arc<dyn ContainerRuntime>,
        proxy: Arc<dyn ProxyController>,
        probe: Arc<dyn Probe>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            env,
            runtime,
            proxy,
            probe,
            notifier,
        }
    }

    /// Run one deployment to completion.
    ///
    /// On failure the compensation stack has already been unwound and
    /// a best-effort notification sent; the returned failure carries
    /// the stage, the error, and captured instance logs when the
    /// target's health was the problem.
    pub async fn run(&self, request: &DeploymentRequest) -> Result<DeploymentOutcome, SwapFailure> {
        let mut state = RunState::new();

        let result = if self.config.deadline_secs == 0 {
            self.execute(request, &mut state).await
        } else {
            let deadline = Duration::from_secs(self.config.deadline_secs);
            match timeout(deadline, self.execute(request, &mut state)).await {
                Ok(result) => result,
                Err(_) => Err(SwapError::DeadlineExceeded(self.config.deadline_secs)),
            }
        };

        match result {
            Ok(target) => {
                let outcome = DeploymentOutcome::success(
                    target,
                    format!("artifact '{}' is live on slot {target}", request.artifact),
                );
                info!(active = %target, "deployment finalized");
                self.notify(&outcome, false).await;
                Ok(outcome)
            }
            Err(cause) => self.fail(request, state, cause).await,
        }
    }

    /// The failure edge: capture diagnostics, unwind, notify.
    async fn fail(
        &self,
        request: &DeploymentRequest,
        mut state: RunState,
        cause: SwapError,
    ) -> Result<DeploymentOutcome, SwapFailure> {
        let failed_phase = state.phase;
        error!(phase = %failed_phase, error = %cause, "deployment failed");

        // Grab the target's logs before rollback removes the instance.
        let diagnostics = match (&cause, state.target) {
            (
                SwapError::HealthCheckTimeout { .. }
                | SwapError::PostSwitchHealth(_)
                | SwapError::FinalVerification(_),
                Some(target),
            ) => {
                let name = self.config.instance_name(target);
                self.runtime.logs(&name, 200).await.ok()
            }
            _ => None,
        };

        let (phase, error) = if state.stack.is_empty() {
            (failed_phase, cause)
        } else {
            state.phase = SwapPhase::RollingBack;
            match state
                .stack
                .unwind(self.runtime.as_ref(), self.proxy.as_ref())
                .await
            {
                Ok(()) => {
                    info!("rollback complete, system restored to pre-deployment state");
                    (failed_phase, cause)
                }
                Err(failures) => (
                    SwapPhase::RollingBack,
                    SwapError::RollbackFailed(format!(
                        "while handling '{cause}': {}",
                        failures.join("; ")
                    )),
                ),
            }
        };

        let outcome = DeploymentOutcome::failure(
            state.active,
            format!(
                "artifact '{}' failed during {phase}: {error}",
                request.artifact
            ),
        );
        self.notify(&outcome, matches!(error, SwapError::RollbackFailed(_)))
            .await;

        Err(SwapFailure {
            phase,
            error,
            diagnostics,
        })
    }

    async fn execute(
        &self,
        request: &DeploymentRequest,
        state: &mut RunState,
    ) -> Result<Slot, SwapError> {
        // ── Resolve ────────────────────────────────────────────────
        state.phase = SwapPhase::Resolving;
        let active = resolver::resolve_active(self.runtime.as_ref(), &self.config).await?;
        let target = active.other();
        state.active = Some(active);
        state.target = Some(target);
        info!(%active, %target, artifact = %request.artifact, "starting swap");

        // ── Fetch (must succeed before any mutation) ───────────────
        state.phase = SwapPhase::Fetching;
        let image = self
            .env
            .image_ref(&self.config.service.image, &request.artifact);
        if let (Some(registry), Some(user), Some(password)) = (
            &self.env.registry,
            &self.env.registry_user,
            &self.env.registry_password,
        ) {
            self.runtime
                .login(registry, user, password)
                .await
                .map_err(|e| SwapError::Authentication(e.to_string()))?;
        }
        self.runtime.pull(&image).await.map_err(|e| match e {
            RuntimeError::ImageNotFound { .. } => SwapError::ArtifactNotFound(e.to_string()),
            other => SwapError::Runtime(other),
        })?;

        // ── Launch ─────────────────────────────────────────────────
        state.phase = SwapPhase::Launching;
        let target_name = self.config.instance_name(target);
        // A stale instance under the target name would block the
        // launch; removing it first makes retries safe.
        self.runtime
            .remove(&target_name)
            .await
            .map_err(|e| SwapError::Launch(e.to_string()))?;
        state.stack.push(Compensation::RemoveInstance {
            name: target_name.clone(),
        });
        let spec = self.run_spec(target, &image, request);
        self.runtime
            .run(&spec)
            .await
            .map_err(|e| SwapError::Launch(e.to_string()))?;

        // ── Health gate ────────────────────────────────────────────
        state.phase = SwapPhase::HealthChecking;
        let gate = RetryPolicy::new(
            self.config.health.attempts,
            Duration::from_secs(self.config.health.interval_secs),
        )
        .with_warmup(Duration::from_secs(self.config.health.warmup_secs));
        let target_address = format!("127.0.0.1:{}", self.config.slot_port(target));
        let health_path = self.config.service.health_path.as_str();
        let probe = &self.probe;
        retry::poll(&gate, |_| {
            let address = target_address.as_str();
            async move { probe.check(address, health_path).await.is_healthy() }
        })
        .await
        .map_err(|e| SwapError::HealthCheckTimeout {
            attempts: e.attempts,
        })?;
        info!(slot = %target, "health gate passed");

        // ── Switch ─────────────────────────────────────────────────
        state.phase = SwapPhase::Switching;
        let routing = RoutingConfig::render(&RoutingSpec {
            upstream: format!("{}_upstream", self.config.service.name.replace('-', "_")),
            listen_port: self.config.proxy.listen_port,
            upstream_port: self.config.slot_port(target),
            health_path: self.config.service.health_path.clone(),
            metrics_path: self.config.proxy.metrics_path.clone(),
            metrics_allow: self.config.proxy.metrics_allow.clone(),
        });
        self.proxy.validate(&routing).await.map_err(|e| match e {
            ProxyError::Validation(reason) => SwapError::RoutingValidation(reason),
            other => SwapError::Proxy(other),
        })?;
        let snapshot = self.proxy.apply(&routing).await?;
        state.stack.push(Compensation::RestoreRouting { snapshot });

        // ── Monitor ────────────────────────────────────────────────
        state.phase = SwapPhase::Monitoring;
        let confirm = RetryPolicy::new(
            self.config.monitor.confirm_attempts,
            Duration::from_secs(self.config.monitor.confirm_interval_secs),
        );
        let live_address = format!("127.0.0.1:{}", self.config.proxy.listen_port);
        retry::poll(&confirm, |_| {
            let address = live_address.as_str();
            async move { probe.check(address, health_path).await.is_healthy() }
        })
        .await
        .map_err(|e| {
            SwapError::PostSwitchHealth(format!(
                "no healthy response through the live route within {} attempts",
                e.attempts
            ))
        })?;

        let soak = Duration::from_secs(self.config.monitor.soak_secs);
        info!(
            soak_secs = self.config.monitor.soak_secs,
            "post-switch confirmation passed, soaking"
        );
        sleep(soak).await;

        if !probe.check(&live_address, health_path).await.is_healthy() {
            return Err(SwapError::FinalVerification(
                "health regressed during the soak period".to_string(),
            ));
        }

        // ── Finalize ───────────────────────────────────────────────
        state.phase = SwapPhase::Finalizing;
        let old_name = self.config.instance_name(active);
        self.runtime.remove(&old_name).await?;
        // The deployment is confirmed; the rollback snapshot and the
        // remove-target compensation are no longer meaningful.
        state.stack.discard();

        state.phase = SwapPhase::Done;
        Ok(target)
    }

    fn run_spec(&self, target: Slot, image: &str, request: &DeploymentRequest) -> RunSpec {
        let mut env = Vec::new();
        if let Some(uri) = &self.env.tracking_uri {
            env.push(("MLFLOW_TRACKING_URI".to_string(), uri.clone()));
        }
        if let Some(user) = &self.env.tracking_user {
            env.push(("MLFLOW_TRACKING_USERNAME".to_string(), user.clone()));
        }
        if let Some(password) = &self.env.tracking_password {
            env.push(("MLFLOW_TRACKING_PASSWORD".to_string(), password.clone()));
        }
        if let Some(region) = &self.env.region {
            env.push(("AWS_REGION".to_string(), region.clone()));
        }
        env.push(("DEPLOYMENT_SLOT".to_string(), target.to_string()));
        env.extend(request.extra_env.iter().cloned());

        RunSpec {
            name: self.config.instance_name(target),
            image: image.to_string(),
            host_port: self.config.slot_port(target),
            container_port: self.config.service.container_port,
            env,
            volumes: request.volumes.clone(),
            log_driver: self.config.service.log_driver.clone(),
        }
    }

    /// Best-effort terminal notification; failures are logged and
    /// swallowed, never escalated.
    async fn notify(&self, outcome: &DeploymentOutcome, rollback_failed: bool) {
        let subject = if outcome.is_success() {
            "cutover succeeded"
        } else if rollback_failed {
            "cutover rollback failed: manual intervention required"
        } else {
            "cutover failed"
        };
        if let Err(e) = self.notifier.publish(subject, &outcome.reason).await {
            warn!(error = %e, "failed to publish outcome notification");
        }
    }
}
