//! Polymorphic firewall driver surface.

use async_trait::async_trait;
use tokio::sync::RwLock;

use appvakt_core::error::ControlError;
use appvakt_core::process::ProcessHandle;
use appvakt_core::rule::ManagedRule;
use appvakt_core::target::ApplicationTarget;

/// Capability set shared by every firewall driver variant.
#[async_trait]
pub trait FirewallBackend: Send + Sync {
    /// Prepare the platform firewall for managed rules. Idempotent: calling
    /// it when already initialized is a no-op success.
    async fn ensure_initialized(&self) -> Result<(), ControlError>;

    /// Rules bearing this system's tag. Malformed or partially-matched
    /// entries are omitted, not errored; untagged rules are never returned.
    async fn list_managed_rules(&self) -> Result<Vec<ManagedRule>, ControlError>;

    /// Converge toward "blocked" for `target`, covering `live` as the
    /// variant's binding model requires. Idempotent: existing coverage of
    /// the same binding is not duplicated.
    async fn add_block_rule(
        &self,
        target: &ApplicationTarget,
        live: &[ProcessHandle],
    ) -> Result<(), ControlError>;

    /// Remove every managed rule attributable to `target`. Succeeds when
    /// nothing is left to remove.
    async fn remove_block_rule(
        &self,
        target: &ApplicationTarget,
        live: &[ProcessHandle],
    ) -> Result<(), ControlError>;

    /// Whether at least one managed block rule is attributable to `target`.
    async fn is_blocked(&self, target: &ApplicationTarget) -> Result<bool, ControlError>;
}

/// Serializes access to one driver instance.
///
/// Mutations are exclusive; read-only calls run concurrently with each other
/// but never with a mutation, because the chain driver's fallback sweep
/// deletes by positional index and any interleaved mutation invalidates the
/// indices it just read.
pub struct SerializedBackend {
    inner: Box<dyn FirewallBackend>,
    gate: RwLock<()>,
}

impl SerializedBackend {
    pub fn new(inner: Box<dyn FirewallBackend>) -> Self {
        Self {
            inner,
            gate: RwLock::new(()),
        }
    }
}

#[async_trait]
impl FirewallBackend for SerializedBackend {
    async fn ensure_initialized(&self) -> Result<(), ControlError> {
        let _guard = self.gate.write().await;
        self.inner.ensure_initialized().await
    }

    async fn list_managed_rules(&self) -> Result<Vec<ManagedRule>, ControlError> {
        let _guard = self.gate.read().await;
        self.inner.list_managed_rules().await
    }

    async fn add_block_rule(
        &self,
        target: &ApplicationTarget,
        live: &[ProcessHandle],
    ) -> Result<(), ControlError> {
        let _guard = self.gate.write().await;
        self.inner.add_block_rule(target, live).await
    }

    async fn remove_block_rule(
        &self,
        target: &ApplicationTarget,
        live: &[ProcessHandle],
    ) -> Result<(), ControlError> {
        let _guard = self.gate.write().await;
        self.inner.remove_block_rule(target, live).await
    }

    async fn is_blocked(&self, target: &ApplicationTarget) -> Result<bool, ControlError> {
        let _guard = self.gate.read().await;
        self.inner.is_blocked(target).await
    }
}
