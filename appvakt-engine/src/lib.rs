//! ## appvakt-engine
//! **Reconciliation between intent, the process table and firewall state**
//!
//! The reconciler is the orchestration layer: it resolves paths to targets,
//! queries the live inventory, drives the firewall backend toward the
//! desired state and keeps the durable blocked set in step. All state it
//! needs is passed in explicitly at construction; there are no ambient
//! globals.

pub mod reconciler;

pub use reconciler::{ReconcileReport, RuleReconciler};
