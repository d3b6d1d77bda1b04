//! Reconcile core for ElastiCache replication groups.

pub mod diff;
pub mod reconcile;
pub mod status;
pub mod validate;
pub mod view;
pub mod waiter;

pub use reconcile::{GroupReconciler, GroupState, ReconcileSettings};
