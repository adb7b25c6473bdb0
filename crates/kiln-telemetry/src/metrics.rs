//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes the counters relevant to provisioning tasks and artifact builds.

use std::sync::Arc;

use anyhow::{Context, Result};
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

/// Prometheus-backed metrics registry shared across services.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    task_runs_total: IntCounterVec,
    task_outcomes_total: IntCounterVec,
    subtasks_total: IntCounterVec,
    rollbacks_total: IntCounterVec,
    build_items_total: IntCounterVec,
    build_pending_items: IntGauge,
}

/// Snapshot of selected gauges and counters for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Task runs that finished successfully.
    pub tasks_succeeded: u64,
    /// Task runs that failed (with or without a clean rollback).
    pub tasks_failed: u64,
    /// Rollback steps that could not undo their subtask.
    pub rollbacks_failed: u64,
    /// Artifacts rebuilt successfully.
    pub build_items_succeeded: u64,
    /// Artifacts whose regeneration failed.
    pub build_items_failed: u64,
    /// Artifacts still waiting for the build worker.
    pub build_pending_items: i64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let task_runs_total = IntCounterVec::new(
            Opts::new("task_runs_total", "Provisioning task runs by outcome"),
            &["task", "status"],
        )?;
        let task_outcomes_total = IntCounterVec::new(
            Opts::new("task_outcomes_total", "Provisioning task outcomes across all tasks"),
            &["status"],
        )?;
        let subtasks_total = IntCounterVec::new(
            Opts::new("subtasks_total", "Subtasks executed by kind and status"),
            &["kind", "status"],
        )?;
        let rollbacks_total = IntCounterVec::new(
            Opts::new("rollbacks_total", "Subtask rollbacks by outcome"),
            &["outcome"],
        )?;
        let build_items_total = IntCounterVec::new(
            Opts::new("build_items_total", "Artifact regenerations by status"),
            &["status"],
        )?;
        let build_pending_items = IntGauge::with_opts(Opts::new(
            "build_pending_items",
            "Stale artifacts not yet regenerated",
        ))?;

        registry.register(Box::new(task_runs_total.clone()))?;
        registry.register(Box::new(task_outcomes_total.clone()))?;
        registry.register(Box::new(subtasks_total.clone()))?;
        registry.register(Box::new(rollbacks_total.clone()))?;
        registry.register(Box::new(build_items_total.clone()))?;
        registry.register(Box::new(build_pending_items.clone()))?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                task_runs_total,
                task_outcomes_total,
                subtasks_total,
                rollbacks_total,
                build_items_total,
                build_pending_items,
            }),
        })
    }

    /// Record the outcome of a task run.
    pub fn inc_task_run(&self, task: &str, status: &str) {
        self.inner
            .task_runs_total
            .with_label_values(&[task, status])
            .inc();
        self.inner
            .task_outcomes_total
            .with_label_values(&[status])
            .inc();
    }

    /// Record a subtask state transition.
    pub fn inc_subtask(&self, kind: &str, status: &str) {
        self.inner
            .subtasks_total
            .with_label_values(&[kind, status])
            .inc();
    }

    /// Record the outcome of a subtask rollback.
    pub fn inc_rollback(&self, outcome: &str) {
        self.inner
            .rollbacks_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Record the outcome of one artifact regeneration.
    pub fn inc_build_item(&self, status: &str) {
        self.inner
            .build_items_total
            .with_label_values(&[status])
            .inc();
    }

    /// Update the number of artifacts still queued for regeneration.
    pub fn set_build_pending(&self, pending: i64) {
        self.inner.build_pending_items.set(pending);
    }

    /// Render the registry in Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded as UTF-8 text.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .context("failed to encode metrics")?;
        String::from_utf8(buffer).context("metrics output was not valid utf-8")
    }

    /// Capture a snapshot of the counters used in summaries.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tasks_succeeded: self
                .inner
                .task_outcomes_total
                .with_label_values(&["succeeded"])
                .get(),
            tasks_failed: self
                .inner
                .task_outcomes_total
                .with_label_values(&["failed"])
                .get(),
            rollbacks_failed: self
                .inner
                .rollbacks_total
                .with_label_values(&["failed"])
                .get(),
            build_items_succeeded: self
                .inner
                .build_items_total
                .with_label_values(&["succeeded"])
                .get(),
            build_items_failed: self
                .inner
                .build_items_total
                .with_label_values(&["failed"])
                .get(),
            build_pending_items: self.inner.build_pending_items.get(),
        }
    }
}
