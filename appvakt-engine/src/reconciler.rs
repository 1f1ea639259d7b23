use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use opentelemetry::KeyValue;
use serde::Serialize;
use tracing::{info, warn};

use appvakt_core::error::ControlError;
use appvakt_core::inventory::ProcessInventory;
use appvakt_core::record::ApplicationRecord;
use appvakt_core::registry::BlockedSetRegistry;
use appvakt_core::target::ApplicationTarget;
use appvakt_firewall::FirewallBackend;
use appvakt_telemetry::logging::EventLogger;
use appvakt_telemetry::metrics::MetricsRecorder;

/// Outcome of one reconcile pass over the persisted blocked set.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ReconcileReport {
    /// Paths whose block rules were re-applied this pass.
    pub applied: Vec<String>,
    /// Paths already covered by live rules.
    pub unchanged: Vec<String>,
    /// Paths with no live process, or no longer present on disk.
    pub skipped: Vec<String>,
    /// Network-capable paths blocked on first sight this pass.
    pub auto_blocked: Vec<String>,
    /// Paths whose re-application failed, with the platform error text.
    pub failed: Vec<(String, String)>,
}

/// Converges firewall state toward the caller's blocked/allowed intent.
pub struct RuleReconciler {
    backend: Arc<dyn FirewallBackend>,
    inventory: Arc<dyn ProcessInventory>,
    registry: Arc<dyn BlockedSetRegistry>,
    metrics: MetricsRecorder,
}

impl RuleReconciler {
    pub fn new(
        backend: Arc<dyn FirewallBackend>,
        inventory: Arc<dyn ProcessInventory>,
        registry: Arc<dyn BlockedSetRegistry>,
        metrics: MetricsRecorder,
    ) -> Self {
        Self {
            backend,
            inventory,
            registry,
            metrics,
        }
    }

    /// Prepare the platform firewall. Idempotent; must run before the first
    /// mutation.
    pub async fn ensure_initialized(&self) -> Result<(), ControlError> {
        self.backend.ensure_initialized().await
    }

    /// Drive the firewall toward `desired` for the application at `path`,
    /// then record the intent in the blocked set.
    pub async fn set_blocked(&self, path: &Path, desired: bool) -> Result<(), ControlError> {
        let target = ApplicationTarget::resolve(path)?;
        let live = self.inventory.find_by_path(target.canonical_path());

        if desired {
            self.backend.add_block_rule(&target, &live).await?;
            self.metrics.rules_installed.inc();
            info!(application = %target, instances = live.len(), "application blocked");
        } else {
            // Succeeds even with no running instance; the backend falls
            // back to its path-keyed sweep for rules whose pid is gone.
            self.backend.remove_block_rule(&target, &live).await?;
            self.metrics.rules_removed.inc();
            info!(application = %target, "application unblocked");
        }

        self.persist_intent(&target, desired);
        EventLogger::log_event(
            if desired {
                "application_blocked"
            } else {
                "application_unblocked"
            },
            vec![KeyValue::new(
                "path",
                target.canonical_path().display().to_string(),
            )],
        )
        .await;
        Ok(())
    }

    /// Whether the firewall currently enforces a block for `path`.
    pub async fn is_blocked(&self, path: &Path) -> Result<bool, ControlError> {
        let target = ApplicationTarget::resolve(path)?;
        self.backend.is_blocked(&target).await
    }

    /// Every currently-running, network-capable process, with its `blocked`
    /// flag computed from actual rule state. The blocked set plays no part
    /// here: enforcement is what callers get to see.
    pub async fn list_network_applications(
        &self,
    ) -> Result<Vec<ApplicationRecord>, ControlError> {
        let mut blocked_by_path: HashMap<PathBuf, bool> = HashMap::new();
        let mut records = Vec::new();

        for handle in self.inventory.enumerate() {
            if !self.inventory.has_network_activity(&handle) {
                continue;
            }
            // The process table moves under us; a handle whose binary is
            // gone by now is churn, not an error.
            let target = match ApplicationTarget::resolve(&handle.executable_path) {
                Ok(target) => target,
                Err(_) => continue,
            };

            let key = target.canonical_path().to_path_buf();
            let blocked = match blocked_by_path.get(&key) {
                Some(blocked) => *blocked,
                None => {
                    let blocked = self.backend.is_blocked(&target).await?;
                    blocked_by_path.insert(key, blocked);
                    blocked
                }
            };

            records.push(ApplicationRecord {
                name: target.name().to_string(),
                canonical_path: target.canonical_path().to_path_buf(),
                pid: handle.pid,
                blocked,
            });
        }
        Ok(records)
    }

    /// Re-apply the persisted blocked set to whatever is running now.
    ///
    /// Per-entry failures are collected into the report rather than aborting
    /// the pass; a path with no live process is left for a later pass. With
    /// `auto_block_new_apps` set, network-capable applications outside the
    /// blocked set are blocked on first sight and added to it.
    pub async fn reconcile(
        &self,
        auto_block_new_apps: bool,
    ) -> Result<ReconcileReport, ControlError> {
        self.ensure_initialized().await?;
        let timer = self.metrics.reconcile_duration.start_timer();

        let mut blocked_set = self.registry.load();
        let mut report = ReconcileReport::default();
        for path in &blocked_set {
            let target = match ApplicationTarget::resolve(path) {
                Ok(target) => target,
                Err(_) => {
                    report.skipped.push(path.clone());
                    continue;
                }
            };
            let live = self.inventory.find_by_path(target.canonical_path());
            if live.is_empty() {
                report.skipped.push(path.clone());
                continue;
            }

            match self.backend.is_blocked(&target).await {
                Ok(true) => report.unchanged.push(path.clone()),
                Ok(false) => match self.backend.add_block_rule(&target, &live).await {
                    Ok(()) => {
                        self.metrics.rules_installed.inc();
                        report.applied.push(path.clone());
                    }
                    Err(e) => report.failed.push((path.clone(), e.to_string())),
                },
                Err(e) => report.failed.push((path.clone(), e.to_string())),
            }
        }

        if auto_block_new_apps {
            self.auto_block_pass(&mut blocked_set, &mut report).await;
        }

        timer.observe_duration();
        self.metrics.reconcile_passes.inc();
        info!(
            applied = report.applied.len(),
            unchanged = report.unchanged.len(),
            skipped = report.skipped.len(),
            auto_blocked = report.auto_blocked.len(),
            failed = report.failed.len(),
            "reconcile pass complete"
        );
        Ok(report)
    }

    /// Block network-capable applications the blocked set has never seen.
    ///
    /// Applications already enforced by a rule are left alone; newly blocked
    /// paths are added to the set, which is persisted once at the end of the
    /// pass.
    async fn auto_block_pass(
        &self,
        blocked_set: &mut std::collections::BTreeSet<String>,
        report: &mut ReconcileReport,
    ) {
        let mut considered: std::collections::HashSet<String> = std::collections::HashSet::new();
        for handle in self.inventory.enumerate() {
            if !self.inventory.has_network_activity(&handle) {
                continue;
            }
            let target = match ApplicationTarget::resolve(&handle.executable_path) {
                Ok(target) => target,
                Err(_) => continue,
            };
            let path = target.canonical_path().display().to_string();
            if blocked_set.contains(&path) || !considered.insert(path.clone()) {
                continue;
            }

            match self.backend.is_blocked(&target).await {
                Ok(true) => {}
                Ok(false) => {
                    let live = self.inventory.find_by_path(target.canonical_path());
                    match self.backend.add_block_rule(&target, &live).await {
                        Ok(()) => {
                            self.metrics.rules_installed.inc();
                            info!(application = %target, "auto-blocked new application");
                            blocked_set.insert(path.clone());
                            report.auto_blocked.push(path);
                        }
                        Err(e) => report.failed.push((path, e.to_string())),
                    }
                }
                Err(e) => report.failed.push((path, e.to_string())),
            }
        }

        if !report.auto_blocked.is_empty() {
            if let Err(e) = self.registry.save(blocked_set) {
                warn!(error = %e, "failed to persist blocked set");
            }
        }
    }

    /// The firewall mutation already succeeded at this point, so a registry
    /// failure is logged and swallowed: firewall state is authoritative and
    /// the set is only an advisory cache for the next pass.
    fn persist_intent(&self, target: &ApplicationTarget, desired: bool) {
        let mut set = self.registry.load();
        let path = target.canonical_path().display().to_string();
        let changed = if desired {
            set.insert(path)
        } else {
            set.remove(&path)
        };
        if !changed {
            return;
        }
        if let Err(e) = self.registry.save(&set) {
            warn!(application = %target, error = %e, "failed to persist blocked set");
        }
    }
}
