//! Per-module status reconciliation for one case.
//!
//! Each poll yields a full snapshot. The snapshot is keyed by module name and
//! compared with the current map; an unchanged snapshot keeps the current
//! `Arc` so callers can skip work by pointer comparison.

use scan_api::ScanApi;
use scanview_core::poll::Liveness;
use scanview_core::{CaseId, ModuleStatus, StatusEntry};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleState {
    pub name: String,
    pub status: ModuleStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

/// Module name -> state, ordered by name.
pub type StatusMap = BTreeMap<String, ModuleState>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionEvent {
    pub case: CaseId,
    pub module: String,
    pub from: ModuleStatus,
    pub to: ModuleStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl TransitionEvent {
    pub fn is_completion(&self) -> bool {
        self.to == ModuleStatus::Completed
    }

    pub fn is_failure(&self) -> bool {
        self.to == ModuleStatus::Failed
    }

    /// A finished module went back to work.
    pub fn is_rerun(&self) -> bool {
        self.from.is_terminal() && !self.to.is_terminal()
    }
}

#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub states: Arc<StatusMap>,
    pub changed: bool,
    pub transitions: Vec<TransitionEvent>,
    /// Set on the one tick that performed the automatic selection.
    pub auto_selected: Option<String>,
}

pub struct ModuleStatusReconciler {
    case: CaseId,
    states: Arc<StatusMap>,
    selected: Option<String>,
    auto_select: bool,
    filled_once: bool,
}

impl ModuleStatusReconciler {
    pub fn new(case: CaseId) -> Self {
        ModuleStatusReconciler { case, states: Arc::new(StatusMap::new()), selected: None, auto_select: true, filled_once: false }
    }

    pub fn with_auto_select(mut self, on: bool) -> Self {
        self.auto_select = on;
        self
    }

    pub fn case(&self) -> &CaseId {
        &self.case
    }

    pub fn states(&self) -> Arc<StatusMap> {
        self.states.clone()
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn select(&mut self, module: &str) {
        self.selected = Some(module.to_string());
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    fn unchanged(&self) -> Reconciliation {
        Reconciliation { states: self.states.clone(), changed: false, transitions: Vec::new(), auto_selected: None }
    }

    /// Diff a fetched snapshot against the current map and adopt it if it differs.
    pub fn apply(&mut self, snapshot: Vec<StatusEntry>) -> Reconciliation {
        let mut next = StatusMap::new();
        for e in snapshot {
            let error_detail = if e.status == ModuleStatus::Failed { e.error_detail } else { None };
            next.insert(e.module.clone(), ModuleState { name: e.module, status: e.status, error_detail });
        }

        if same_statuses(&self.states, &next) {
            tracing::debug!(case = %self.case, modules = next.len(), "module status unchanged");
            return self.unchanged();
        }

        let mut transitions = Vec::new();
        for (name, now) in &next {
            let Some(before) = self.states.get(name) else { continue };
            if before.status == now.status {
                continue;
            }
            let t = TransitionEvent {
                case: self.case.clone(),
                module: name.clone(),
                from: before.status,
                to: now.status,
                error_detail: now.error_detail.clone(),
            };
            if t.is_rerun() {
                tracing::info!(case = %self.case, module = %name, from = ?t.from, to = ?t.to, "module rerun");
            } else {
                tracing::info!(case = %self.case, module = %name, from = ?t.from, to = ?t.to, "module transition");
            }
            transitions.push(t);
        }

        let mut auto_selected = None;
        if !next.is_empty() && !self.filled_once {
            self.filled_once = true;
            if self.auto_select && self.selected.is_none() {
                self.selected = next.keys().next().cloned();
                auto_selected = self.selected.clone();
            }
        }

        self.states = Arc::new(next);
        Reconciliation { states: self.states.clone(), changed: true, transitions, auto_selected }
    }

    /// One poll: fetch, then apply if the view is still alive. Fetch failures
    /// are logged and leave the state untouched.
    pub async fn reconcile<A: ScanApi + ?Sized>(&mut self, api: &A, live: &Liveness) -> Reconciliation {
        let rows = match api.module_statuses(&self.case).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(case = %self.case, error = %e, "module status poll failed");
                return self.unchanged();
            }
        };
        if !live.is_alive() {
            return self.unchanged();
        }
        self.apply(rows)
    }
}

fn same_statuses(a: &StatusMap, b: &StatusMap) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).all(|((ka, va), (kb, vb))| ka == kb && va.status == vb.status)
}
