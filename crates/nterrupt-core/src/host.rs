//! Host collaborator contracts.
//!
//! The core never talks to an operating system directly. Wake timers, the
//! full-screen surface and foreground detection are reached through these
//! traits, and every call may fail or be throttled by the host.
//!
//! The `Recording*` types are in-process implementations that remember what
//! was asked of them. Clones share state, so a handle kept outside the engine
//! can inspect or steer the collaborator after it has been boxed.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::error::HostError;
use crate::surface::SurfaceView;

/// Wake-up scheduling primitives.
///
/// One-shot wake-ups are keyed by entity id: scheduling again for the same
/// entity replaces the previous wake-up.
pub trait WakeScheduler: Send {
    fn schedule_one_shot(&mut self, entity_id: &str, at_ms: u64) -> Result<(), HostError>;

    fn cancel_one_shot(&mut self, entity_id: &str);

    fn schedule_repeating(&mut self, interval_ms: u64) -> Result<(), HostError>;

    fn cancel_repeating(&mut self);
}

/// Which surfaces a dismissal targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", content = "entity_id", rename_all = "lowercase")]
pub enum DismissTarget {
    Entity(String),
    All,
}

/// Full-screen, dismiss-proof presentation surface.
pub trait Presenter: Send {
    fn show(&mut self, entity_id: &str, display_name: &str, expiry_ms: u64) -> Result<(), HostError>;

    fn bring_to_front(&mut self, entity_id: &str) -> Result<(), HostError>;

    /// Redraw an already visible surface.
    fn render(&mut self, view: &SurfaceView);

    fn dismiss(&mut self, target: &DismissTarget);
}

/// Best-effort answer to "which entity has user focus right now".
pub trait ForegroundProbe: Send {
    fn current_foreground_entity(&mut self) -> Option<String>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── Scheduler ────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct SchedulerLog {
    one_shots: BTreeMap<String, u64>,
    repeating: Option<u64>,
    cancelled: Vec<String>,
    reject_one_shots: bool,
}

/// Scheduler that records wake-ups instead of arming real timers.
#[derive(Debug, Clone, Default)]
pub struct RecordingScheduler {
    inner: Arc<Mutex<SchedulerLog>>,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every one-shot request fail, as a throttling host would.
    pub fn reject_one_shots(&self, reject: bool) {
        lock(&self.inner).reject_one_shots = reject;
    }

    pub fn one_shot_at(&self, entity_id: &str) -> Option<u64> {
        lock(&self.inner).one_shots.get(entity_id).copied()
    }

    pub fn repeating_interval(&self) -> Option<u64> {
        lock(&self.inner).repeating
    }

    /// Entity ids whose one-shot was cancelled, in call order.
    pub fn cancellations(&self) -> Vec<String> {
        lock(&self.inner).cancelled.clone()
    }

    /// Remove and return the wake-ups due at `now_ms`.
    pub fn fire_due(&self, now_ms: u64) -> Vec<String> {
        let mut log = lock(&self.inner);
        let due: Vec<String> = log
            .one_shots
            .iter()
            .filter(|(_, at)| **at <= now_ms)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &due {
            log.one_shots.remove(id);
        }
        due
    }
}

impl WakeScheduler for RecordingScheduler {
    fn schedule_one_shot(&mut self, entity_id: &str, at_ms: u64) -> Result<(), HostError> {
        let mut log = lock(&self.inner);
        if log.reject_one_shots {
            return Err(HostError::Rejected {
                operation: "schedule_one_shot".into(),
                reason: "exact wake-ups throttled".into(),
            });
        }
        log.one_shots.insert(entity_id.to_string(), at_ms);
        Ok(())
    }

    fn cancel_one_shot(&mut self, entity_id: &str) {
        let mut log = lock(&self.inner);
        log.one_shots.remove(entity_id);
        log.cancelled.push(entity_id.to_string());
    }

    fn schedule_repeating(&mut self, interval_ms: u64) -> Result<(), HostError> {
        lock(&self.inner).repeating = Some(interval_ms);
        Ok(())
    }

    fn cancel_repeating(&mut self) {
        lock(&self.inner).repeating = None;
    }
}

// ── Presenter ────────────────────────────────────────────────────────

/// One call made on a [`RecordingPresenter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenterCall {
    Show {
        entity_id: String,
        display_name: String,
        expiry_ms: u64,
    },
    BringToFront(String),
    Render(SurfaceView),
    Dismiss(DismissTarget),
}

#[derive(Debug, Default)]
struct PresenterLog {
    calls: Vec<PresenterCall>,
    visible: BTreeSet<String>,
    fail_show: bool,
}

/// Presenter that tracks which surfaces would be visible.
#[derive(Debug, Clone, Default)]
pub struct RecordingPresenter {
    inner: Arc<Mutex<PresenterLog>>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `show` fail, as a host without overlay permission would.
    pub fn fail_show(&self, fail: bool) {
        lock(&self.inner).fail_show = fail;
    }

    pub fn calls(&self) -> Vec<PresenterCall> {
        lock(&self.inner).calls.clone()
    }

    pub fn show_count(&self, entity_id: &str) -> usize {
        lock(&self.inner)
            .calls
            .iter()
            .filter(|c| matches!(c, PresenterCall::Show { entity_id: id, .. } if id == entity_id))
            .count()
    }

    pub fn is_visible(&self, entity_id: &str) -> bool {
        lock(&self.inner).visible.contains(entity_id)
    }

    pub fn last_render(&self, entity_id: &str) -> Option<SurfaceView> {
        lock(&self.inner).calls.iter().rev().find_map(|c| match c {
            PresenterCall::Render(view) if view.entity_id == entity_id => Some(view.clone()),
            _ => None,
        })
    }
}

impl Presenter for RecordingPresenter {
    fn show(&mut self, entity_id: &str, display_name: &str, expiry_ms: u64) -> Result<(), HostError> {
        let mut log = lock(&self.inner);
        if log.fail_show {
            return Err(HostError::SurfaceFailed {
                entity_id: entity_id.to_string(),
                message: "overlay permission missing".into(),
            });
        }
        log.calls.push(PresenterCall::Show {
            entity_id: entity_id.to_string(),
            display_name: display_name.to_string(),
            expiry_ms,
        });
        log.visible.insert(entity_id.to_string());
        Ok(())
    }

    fn bring_to_front(&mut self, entity_id: &str) -> Result<(), HostError> {
        lock(&self.inner)
            .calls
            .push(PresenterCall::BringToFront(entity_id.to_string()));
        Ok(())
    }

    fn render(&mut self, view: &SurfaceView) {
        lock(&self.inner).calls.push(PresenterCall::Render(view.clone()));
    }

    fn dismiss(&mut self, target: &DismissTarget) {
        let mut log = lock(&self.inner);
        match target {
            DismissTarget::Entity(id) => {
                log.visible.remove(id);
            }
            DismissTarget::All => log.visible.clear(),
        }
        log.calls.push(PresenterCall::Dismiss(target.clone()));
    }
}

// ── Foreground probe ─────────────────────────────────────────────────

/// Probe answering with whatever entity was last set.
#[derive(Debug, Clone, Default)]
pub struct StaticProbe {
    current: Arc<Mutex<Option<String>>>,
}

impl StaticProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, entity_id: Option<&str>) {
        *lock(&self.current) = entity_id.map(str::to_string);
    }
}

impl ForegroundProbe for StaticProbe {
    fn current_foreground_entity(&mut self) -> Option<String> {
        lock(&self.current).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_shots_are_keyed_by_entity() {
        let mut scheduler = RecordingScheduler::new();
        let handle = scheduler.clone();
        scheduler.schedule_one_shot("app", 10_000).unwrap();
        scheduler.schedule_one_shot("app", 3_000).unwrap();
        assert_eq!(handle.one_shot_at("app"), Some(3_000));

        assert!(handle.fire_due(2_999).is_empty());
        assert_eq!(handle.fire_due(3_000), vec!["app".to_string()]);
        assert!(handle.fire_due(10_000).is_empty());
    }

    #[test]
    fn rejected_one_shots_report_host_error() {
        let mut scheduler = RecordingScheduler::new();
        scheduler.reject_one_shots(true);
        assert!(matches!(
            scheduler.schedule_one_shot("app", 1),
            Err(HostError::Rejected { .. })
        ));
        assert_eq!(scheduler.one_shot_at("app"), None);
    }

    #[test]
    fn presenter_tracks_visibility() {
        let mut presenter = RecordingPresenter::new();
        presenter.show("a", "A", 1).unwrap();
        presenter.show("b", "B", 1).unwrap();
        presenter.dismiss(&DismissTarget::Entity("a".into()));
        assert!(!presenter.is_visible("a"));
        assert!(presenter.is_visible("b"));
        presenter.dismiss(&DismissTarget::All);
        assert!(!presenter.is_visible("b"));
        assert_eq!(presenter.show_count("a"), 1);
    }

    #[test]
    fn static_probe_reports_latest_value() {
        let mut probe = StaticProbe::new();
        let handle = probe.clone();
        assert_eq!(probe.current_foreground_entity(), None);
        handle.set(Some("com.example.social"));
        assert_eq!(probe.current_foreground_entity().as_deref(), Some("com.example.social"));
    }
}
