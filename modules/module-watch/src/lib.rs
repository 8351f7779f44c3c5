//! "Module ready" notifications for running cases.
//!
//! The first module listing seen for a case only seeds the index. Names that
//! show up on later polls are reported once each.

use scan_api::{ApiResult, ScanApi};
use scanview_core::poll::Liveness;
use scanview_core::CaseId;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewModuleEvent {
    pub case: CaseId,
    pub module: String,
}

/// Module names already reported, per case. Grows only; drop it with the
/// session that owns it.
#[derive(Debug, Default)]
pub struct SeenModulesIndex {
    seen: HashMap<CaseId, BTreeSet<String>>,
}

impl SeenModulesIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_seeded(&self, case: &CaseId) -> bool {
        self.seen.contains_key(case)
    }

    pub fn seen(&self, case: &CaseId) -> Option<&BTreeSet<String>> {
        self.seen.get(case)
    }

    pub fn cases(&self) -> usize {
        self.seen.len()
    }

    /// Record a module listing. Returns the names not seen before, in listing
    /// order; the first listing for a case returns nothing.
    pub fn observe(&mut self, case: &CaseId, current: &[String]) -> Vec<NewModuleEvent> {
        let Some(set) = self.seen.get_mut(case) else {
            self.seen.insert(case.clone(), current.iter().cloned().collect());
            return Vec::new();
        };
        current
            .iter()
            .filter(|name| set.insert((*name).clone()))
            .map(|name| NewModuleEvent { case: case.clone(), module: name.clone() })
            .collect()
    }
}

/// Outcome of one sweep over several cases.
#[derive(Debug, Default)]
pub struct WatchTick {
    pub events: Vec<NewModuleEvent>,
    pub failed: Vec<CaseId>,
}

pub struct ModuleAppearanceWatcher {
    index: SeenModulesIndex,
}

impl ModuleAppearanceWatcher {
    pub fn new(index: SeenModulesIndex) -> Self {
        ModuleAppearanceWatcher { index }
    }

    pub fn index(&self) -> &SeenModulesIndex {
        &self.index
    }

    pub fn into_index(self) -> SeenModulesIndex {
        self.index
    }

    /// Poll one case. A listing that arrives after the view died is dropped
    /// without touching the index.
    pub async fn watch_case<A: ScanApi + ?Sized>(
        &mut self,
        api: &A,
        case: &CaseId,
        live: &Liveness,
    ) -> ApiResult<Vec<NewModuleEvent>> {
        let names = api.available_modules(case).await?;
        if !live.is_alive() {
            return Ok(Vec::new());
        }
        let events = self.index.observe(case, &names);
        for ev in &events {
            tracing::info!(case = %ev.case, module = %ev.module, "module ready");
        }
        Ok(events)
    }

    /// Poll each listed case; a failure on one case is logged and the sweep
    /// moves on.
    pub async fn tick<A: ScanApi + ?Sized>(&mut self, api: &A, cases: &[CaseId], live: &Liveness) -> WatchTick {
        let mut out = WatchTick::default();
        for case in cases {
            if !live.is_alive() {
                break;
            }
            match self.watch_case(api, case, live).await {
                Ok(mut events) => out.events.append(&mut events),
                Err(e) => {
                    tracing::warn!(case = %case, error = %e, "module list poll failed");
                    out.failed.push(case.clone());
                }
            }
        }
        out
    }

    /// Sweep every case the backend reports as pending or running.
    pub async fn tick_running<A: ScanApi + ?Sized>(&mut self, api: &A, live: &Liveness) -> ApiResult<WatchTick> {
        let cases: Vec<CaseId> =
            api.list_cases().await?.iter().filter(|c| c.status.is_active()).map(|c| c.id()).collect();
        tracing::debug!(running = cases.len(), "module watch sweep");
        Ok(self.tick(api, &cases, live).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_api::{CaseSummary, MemoryScanApi};
    use scanview_core::CaseStatus;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn first_observation_seeds_silently() {
        let mut idx = SeenModulesIndex::new();
        let case = CaseId::from("c1");
        assert!(idx.observe(&case, &names(&["windows.info", "windows.pslist"])).is_empty());
        assert!(idx.is_seeded(&case));
        let ev = idx.observe(&case, &names(&["windows.info", "windows.pslist", "windows.netscan"]));
        assert_eq!(ev, vec![NewModuleEvent { case: case.clone(), module: "windows.netscan".into() }]);
        assert!(idx.observe(&case, &names(&["windows.netscan"])).is_empty());
    }

    #[test]
    fn empty_first_listing_still_seeds() {
        let mut idx = SeenModulesIndex::new();
        let case = CaseId::from("c1");
        assert!(idx.observe(&case, &[]).is_empty());
        assert_eq!(idx.observe(&case, &names(&["a"])).len(), 1);
    }

    #[test]
    fn index_never_shrinks_and_is_per_case() {
        let mut idx = SeenModulesIndex::new();
        let (a, b) = (CaseId::from("a"), CaseId::from("b"));
        idx.observe(&a, &names(&["m1", "m2"]));
        idx.observe(&a, &names(&["m1"]));
        assert_eq!(idx.seen(&a).unwrap().len(), 2);
        assert!(idx.observe(&b, &names(&["m1", "m3"])).is_empty());
        assert_eq!(idx.cases(), 2);
        assert_eq!(idx.observe(&a, &names(&["m1", "m2", "m3", "m3"])).len(), 1);
    }

    #[tokio::test]
    async fn second_tick_reports_new_module_once() {
        let api = MemoryScanApi::new();
        let case = CaseId::from("c1");
        api.push_modules(&case, &["windows.info"]);
        api.push_modules(&case, &["windows.info", "windows.pslist"]);
        let live = Liveness::new();
        let mut w = ModuleAppearanceWatcher::new(SeenModulesIndex::new());

        assert!(w.watch_case(&api, &case, &live).await.unwrap().is_empty());
        let ev = w.watch_case(&api, &case, &live).await.unwrap();
        assert_eq!(ev.len(), 1);
        assert_eq!(ev[0].module, "windows.pslist");
        assert!(w.watch_case(&api, &case, &live).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failing_case_does_not_block_others() {
        let api = MemoryScanApi::new();
        let (bad, good) = (CaseId::from("bad"), CaseId::from("good"));
        api.fail_modules(&bad);
        api.push_modules(&good, &["m1"]);
        api.push_modules(&good, &["m1", "m2"]);
        let live = Liveness::new();
        let mut w = ModuleAppearanceWatcher::new(SeenModulesIndex::new());
        let cases = vec![bad.clone(), good.clone()];

        let t1 = w.tick(&api, &cases, &live).await;
        assert_eq!(t1.failed, vec![bad.clone()]);
        assert!(t1.events.is_empty());
        let t2 = w.tick(&api, &cases, &live).await;
        assert_eq!(t2.failed, vec![bad.clone()]);
        assert_eq!(t2.events, vec![NewModuleEvent { case: good, module: "m2".into() }]);
        assert!(!w.index().is_seeded(&bad));
    }

    #[tokio::test]
    async fn only_active_cases_are_polled() {
        let api = MemoryScanApi::new();
        api.set_cases(vec![
            CaseSummary::new("run", CaseStatus::Running),
            CaseSummary::new("done", CaseStatus::Completed),
            CaseSummary::new("queued", CaseStatus::Pending),
        ]);
        let live = Liveness::new();
        let mut w = ModuleAppearanceWatcher::new(SeenModulesIndex::new());
        w.tick_running(&api, &live).await.unwrap();
        assert_eq!(api.calls("modules"), 2);
        assert!(w.index().is_seeded(&"run".into()));
        assert!(!w.index().is_seeded(&"done".into()));
    }

    #[tokio::test]
    async fn dead_view_leaves_index_untouched() {
        let api = MemoryScanApi::new();
        let case = CaseId::from("c1");
        api.push_modules(&case, &["m1"]);
        let live = Liveness::new();
        live.kill();
        let mut w = ModuleAppearanceWatcher::new(SeenModulesIndex::new());
        assert!(w.watch_case(&api, &case, &live).await.unwrap().is_empty());
        assert!(!w.into_index().is_seeded(&case));
    }
}
