//! Timer-driven view of one open case.
//!
//! Every tick reconciles module statuses for the open case and sweeps running
//! cases for newly available modules. The two polls run concurrently; their
//! results are applied in order once both resolve. When the selected module
//! completes its results are fetched again.

use module_status::{ModuleStatusReconciler, StatusMap, TransitionEvent};
use module_watch::{ModuleAppearanceWatcher, NewModuleEvent, SeenModulesIndex};
use scan_api::ScanApi;
use scanview_core::poll::{self, Liveness};
use scanview_core::{AnalysisRecord, CaseId, ModuleStatus};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    StatesChanged { case: CaseId, states: StatusMap },
    Transition(TransitionEvent),
    AutoSelected { case: CaseId, module: String },
    ModuleReady(NewModuleEvent),
    ResultsRefreshed { case: CaseId, module: String, records: Vec<AnalysisRecord> },
}

pub struct CaseSession {
    api: Arc<dyn ScanApi>,
    statuses: ModuleStatusReconciler,
    watcher: ModuleAppearanceWatcher,
    live: Liveness,
    ticks: u64,
}

impl CaseSession {
    /// `index` is owned by the session and dropped with it.
    pub fn new(api: Arc<dyn ScanApi>, case: CaseId, index: SeenModulesIndex) -> Self {
        CaseSession {
            api,
            statuses: ModuleStatusReconciler::new(case),
            watcher: ModuleAppearanceWatcher::new(index),
            live: Liveness::new(),
            ticks: 0,
        }
    }

    pub fn with_auto_select(mut self, on: bool) -> Self {
        self.statuses = self.statuses.with_auto_select(on);
        self
    }

    pub fn case(&self) -> &CaseId {
        self.statuses.case()
    }

    pub fn selected(&self) -> Option<&str> {
        self.statuses.selected()
    }

    pub fn select(&mut self, module: &str) {
        self.statuses.select(module);
    }

    pub fn states(&self) -> Arc<StatusMap> {
        self.statuses.states()
    }

    pub fn seen(&self) -> &SeenModulesIndex {
        self.watcher.index()
    }

    pub fn liveness(&self) -> Liveness {
        self.live.clone()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub async fn tick(&mut self) -> Vec<SessionEvent> {
        self.ticks += 1;
        let api = &*self.api;
        let (rec, sweep) = tokio::join!(
            self.statuses.reconcile(api, &self.live),
            self.watcher.tick_running(api, &self.live),
        );

        let mut events = Vec::new();
        if !self.live.is_alive() {
            return events;
        }
        let case = self.statuses.case().clone();

        if rec.changed {
            events.push(SessionEvent::StatesChanged { case: case.clone(), states: (*rec.states).clone() });
        }
        let mut refresh = None;
        if let Some(module) = rec.auto_selected {
            if rec.states.get(&module).map(|s| s.status) == Some(ModuleStatus::Completed) {
                refresh = Some(module.clone());
            }
            events.push(SessionEvent::AutoSelected { case: case.clone(), module });
        }
        for t in rec.transitions {
            if t.is_completion() && self.statuses.selected() == Some(t.module.as_str()) {
                refresh = Some(t.module.clone());
            }
            events.push(SessionEvent::Transition(t));
        }

        match sweep {
            Ok(sweep) => events.extend(sweep.events.into_iter().map(SessionEvent::ModuleReady)),
            Err(e) => tracing::warn!(error = %e, "case listing failed"),
        }

        if let Some(module) = refresh {
            if let Some(ev) = self.refresh(&module).await {
                events.push(ev);
            }
        }
        tracing::debug!(case = %case, tick = self.ticks, events = events.len(), "session tick");
        events
    }

    /// Fetch a module's records for the open case.
    pub async fn refresh(&self, module: &str) -> Option<SessionEvent> {
        let case = self.statuses.case();
        match self.api.module_results(case, module).await {
            Ok(records) if self.live.is_alive() => {
                tracing::info!(case = %case, module, records = records.len(), "results refreshed");
                Some(SessionEvent::ResultsRefreshed { case: case.clone(), module: module.to_string(), records })
            }
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(case = %case, module, error = %e, "results fetch failed");
                None
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ViewOptions {
    pub period: Duration,
    /// Stop after this many ticks.
    pub max_ticks: Option<u64>,
}

impl Default for ViewOptions {
    fn default() -> Self {
        ViewOptions { period: poll::DEFAULT_POLL_INTERVAL, max_ticks: None }
    }
}

/// A running case view. Dropping the receiver, dropping the view or calling
/// [`CaseView::close`] ends the loop.
pub struct CaseView {
    live: Liveness,
    task: Option<JoinHandle<CaseSession>>,
}

impl CaseView {
    pub fn open(mut session: CaseSession, opts: ViewOptions, tx: mpsc::Sender<SessionEvent>) -> Self {
        let live = session.liveness();
        let task = tokio::spawn(async move {
            let mut ticker = poll::cadence(opts.period);
            'poll: loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = tx.closed() => break,
                }
                if !session.live.is_alive() {
                    break;
                }
                let events = tokio::select! {
                    events = session.tick() => events,
                    _ = tx.closed() => break,
                };
                for ev in events {
                    if tx.send(ev).await.is_err() {
                        break 'poll;
                    }
                }
                if opts.max_ticks.is_some_and(|n| session.ticks >= n) {
                    break;
                }
            }
            if tx.is_closed() {
                tracing::debug!(case = %session.case(), "event receiver gone, view stopped");
                session.live.kill();
            }
            session
        });
        CaseView { live, task: Some(task) }
    }

    pub fn is_open(&self) -> bool {
        self.live.is_alive() && self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Tear the view down. Pending timers are cancelled and any fetch still in
    /// flight resolves into nothing.
    pub fn close(self) {
        drop(self);
    }

    /// Wait for a bounded view to run out of ticks and get the session back.
    pub async fn join(mut self) -> Option<CaseSession> {
        self.task.take()?.await.ok()
    }
}

impl Drop for CaseView {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            self.live.kill();
            task.abort();
        }
    }
}
