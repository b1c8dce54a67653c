//! One blocking surface per blocked entity.
//!
//! Events returned by the manager have already been applied to its surfaces;
//! raw engine events are applied through [`SurfaceManager::apply`].

use std::collections::BTreeMap;

use super::state::{BlockingSurface, Gesture, GestureOutcome, SurfaceUpdate, SurfaceView};
use crate::block::BlockedEntity;
use crate::clock::to_datetime;
use crate::countdown::CountdownEngine;
use crate::error::HostError;
use crate::events::Event;
use crate::host::{DismissTarget, Presenter};

pub struct SurfaceManager {
    surfaces: BTreeMap<String, BlockingSurface>,
    presenter: Box<dyn Presenter>,
}

impl SurfaceManager {
    pub fn new(presenter: Box<dyn Presenter>) -> Self {
        Self {
            surfaces: BTreeMap::new(),
            presenter,
        }
    }

    pub fn is_showing(&self, entity_id: &str) -> bool {
        self.surfaces
            .get(entity_id)
            .is_some_and(BlockingSurface::is_showing)
    }

    pub fn view(&self, entity_id: &str) -> Option<SurfaceView> {
        self.surfaces.get(entity_id).and_then(BlockingSurface::view)
    }

    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    /// Show the surface for `block`, or bring the existing one to front.
    ///
    /// A surface left over from a replaced block (different expiry) is
    /// dismissed and recreated.
    pub fn show(
        &mut self,
        engine: &mut CountdownEngine,
        block: &BlockedEntity,
    ) -> Result<Vec<Event>, HostError> {
        let entity_id = block.entity_id.as_str();
        let remaining_ms = engine.remaining_time(entity_id);
        let at = to_datetime(engine.now_ms());
        let mut events = Vec::new();

        if let Some(existing) = self.surfaces.get(entity_id) {
            if existing.is_showing() && existing.expiry_ms == block.expiry_ms {
                self.presenter.bring_to_front(entity_id)?;
                return Ok(vec![Event::SurfaceReasserted {
                    entity_id: entity_id.to_string(),
                    at,
                }]);
            }
            self.presenter
                .dismiss(&DismissTarget::Entity(entity_id.to_string()));
            self.surfaces.remove(entity_id);
            events.push(Event::SurfaceDismissed {
                entity_id: entity_id.to_string(),
                at,
            });
        }

        let Some(surface) =
            BlockingSurface::enter(entity_id, &block.display_name, block.expiry_ms, remaining_ms)
        else {
            return Ok(events);
        };

        self.presenter
            .show(entity_id, &block.display_name, block.expiry_ms)?;
        self.surfaces.insert(entity_id.to_string(), surface);
        tracing::info!("Showing blocking surface for {} ({}ms left)", entity_id, remaining_ms);

        events.push(Event::SurfaceShown {
            entity_id: entity_id.to_string(),
            display_name: block.display_name.clone(),
            remaining_ms,
            at,
        });
        let initial = engine.subscribe(entity_id);
        events.extend(self.apply(initial));
        Ok(events)
    }

    /// Rebuild a surface the host destroyed while its block is still active.
    pub fn recreate_if_needed(
        &mut self,
        engine: &mut CountdownEngine,
        entity_id: &str,
    ) -> Result<Vec<Event>, HostError> {
        if self.is_showing(entity_id) {
            return Ok(Vec::new());
        }
        let remaining_ms = engine.remaining_time(entity_id);
        if remaining_ms == 0 {
            return Ok(Vec::new());
        }
        let block = match engine.block(entity_id) {
            Some(block) => block.clone(),
            // Only the durable tier knows about it.
            None => BlockedEntity::restored(entity_id, None, remaining_ms, engine.now_ms()),
        };
        tracing::debug!("Recreating blocking surface for {}", entity_id);
        self.show(engine, &block)
    }

    /// The host tore the surface down for lifecycle reasons.
    ///
    /// Returns `true` if the countdown subscription was kept because the
    /// block is still active.
    pub fn teardown(&mut self, engine: &mut CountdownEngine, entity_id: &str) -> bool {
        self.surfaces.remove(entity_id);
        if engine.remaining_time(entity_id) == 0 {
            engine.unsubscribe(entity_id);
            false
        } else {
            tracing::debug!(
                "Surface for {} torn down while block active; keeping subscription",
                entity_id
            );
            true
        }
    }

    /// Apply engine events to the surfaces. Returns the input events
    /// interleaved with the surface events they caused.
    pub fn apply(&mut self, events: Vec<Event>) -> Vec<Event> {
        let mut out = Vec::with_capacity(events.len());
        for event in events {
            let follow = self.handle_event(&event);
            out.push(event);
            out.extend(follow);
        }
        out
    }

    pub fn handle_event(&mut self, event: &Event) -> Vec<Event> {
        match event {
            Event::CountdownUpdate {
                entity_id,
                remaining_ms,
                at,
            } => {
                let Some(surface) = self.surfaces.get_mut(entity_id) else {
                    return Vec::new();
                };
                match surface.on_tick(*remaining_ms) {
                    SurfaceUpdate::Redraw(view) => {
                        self.presenter.render(&view);
                        Vec::new()
                    }
                    SurfaceUpdate::Expired => self.hide(entity_id, *at),
                    SurfaceUpdate::Ignored => Vec::new(),
                }
            }
            Event::BlockExpired { entity_id, at } | Event::BlockStopped { entity_id, at, .. } => {
                let hidden = self
                    .surfaces
                    .get_mut(entity_id)
                    .is_some_and(|surface| surface.on_expired());
                if hidden {
                    self.hide(entity_id, *at)
                } else {
                    Vec::new()
                }
            }
            _ => Vec::new(),
        }
    }

    /// Intercept a dismissal gesture. The surface is never hidden by it.
    pub fn gesture(&mut self, entity_id: &str, gesture: Gesture, now_ms: u64) -> Vec<Event> {
        let Some(surface) = self.surfaces.get(entity_id) else {
            return Vec::new();
        };
        match surface.on_gesture(gesture) {
            GestureOutcome::Reasserted => {
                if let Err(e) = self.presenter.bring_to_front(entity_id) {
                    tracing::warn!("Failed to re-assert surface for {}: {}", entity_id, e);
                    return Vec::new();
                }
                vec![Event::SurfaceReasserted {
                    entity_id: entity_id.to_string(),
                    at: to_datetime(now_ms),
                }]
            }
            GestureOutcome::Swallowed => {
                tracing::debug!("Swallowed {} gesture on {}", gesture, entity_id);
                Vec::new()
            }
            GestureOutcome::Ignored => Vec::new(),
        }
    }

    /// Dismiss every surface at once (service shutdown).
    pub fn dismiss_all(&mut self, now_ms: u64) -> Vec<Event> {
        if self.surfaces.is_empty() {
            return Vec::new();
        }
        self.presenter.dismiss(&DismissTarget::All);
        let at = to_datetime(now_ms);
        std::mem::take(&mut self.surfaces)
            .into_keys()
            .map(|entity_id| Event::SurfaceDismissed { entity_id, at })
            .collect()
    }

    fn hide(&mut self, entity_id: &str, at: chrono::DateTime<chrono::Utc>) -> Vec<Event> {
        self.surfaces.remove(entity_id);
        self.presenter
            .dismiss(&DismissTarget::Entity(entity_id.to_string()));
        tracing::info!("Dismissed blocking surface for {}", entity_id);
        vec![Event::SurfaceDismissed {
            entity_id: entity_id.to_string(),
            at,
        }]
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::host::{PresenterCall, RecordingPresenter, RecordingScheduler};
    use crate::storage::{CountdownRecord, CountdownStore, EngineConfig, MemoryCountdownStore};

    const T0: u64 = 1_700_000_000_000;

    struct Harness {
        engine: CountdownEngine,
        surfaces: SurfaceManager,
        presenter: RecordingPresenter,
        clock: ManualClock,
        store: MemoryCountdownStore,
    }

    fn harness() -> Harness {
        let clock = ManualClock::new(T0);
        let store = MemoryCountdownStore::new();
        let presenter = RecordingPresenter::new();
        let engine = CountdownEngine::new(
            Box::new(store.clone()),
            Box::new(RecordingScheduler::new()),
            Arc::new(clock.clone()),
            &EngineConfig::default(),
        );
        Harness {
            engine,
            surfaces: SurfaceManager::new(Box::new(presenter.clone())),
            presenter,
            clock,
            store,
        }
    }

    fn start(h: &mut Harness, id: &str, duration_ms: u64) -> BlockedEntity {
        h.engine.start(id, "Social", duration_ms).unwrap();
        h.engine.block(id).unwrap().clone()
    }

    #[test]
    fn show_is_idempotent_for_the_same_block() {
        let mut h = harness();
        let block = start(&mut h, "social", 600_000);

        let first = h.surfaces.show(&mut h.engine, &block).unwrap();
        assert!(matches!(first[0], Event::SurfaceShown { .. }));
        let second = h.surfaces.show(&mut h.engine, &block).unwrap();
        assert!(matches!(&second[..], [Event::SurfaceReasserted { .. }]));

        assert_eq!(h.presenter.show_count("social"), 1);
        assert!(h.engine.listeners().contains("social"));
    }

    #[test]
    fn show_renders_initial_countdown() {
        let mut h = harness();
        let block = start(&mut h, "social", 600_000);
        h.surfaces.show(&mut h.engine, &block).unwrap();

        let view = h.presenter.last_render("social").unwrap();
        assert_eq!(view.countdown, "10:00");
        assert_eq!(view.message, "This app will be available again in:");
        assert_eq!(view.title, "Social is Blocked");
    }

    #[test]
    fn replaced_block_recreates_surface() {
        let mut h = harness();
        let first = start(&mut h, "social", 600_000);
        h.surfaces.show(&mut h.engine, &first).unwrap();
        let second = start(&mut h, "social", 60_000);

        let events = h.surfaces.show(&mut h.engine, &second).unwrap();
        assert!(matches!(
            &events[..2],
            [Event::SurfaceDismissed { .. }, Event::SurfaceShown { .. }]
        ));
        assert_eq!(h.presenter.show_count("social"), 2);
        assert!(h.presenter.is_visible("social"));
    }

    #[test]
    fn expiry_dismisses_once() {
        let mut h = harness();
        let block = start(&mut h, "social", 2_000);
        h.surfaces.show(&mut h.engine, &block).unwrap();

        h.clock.advance(2_000);
        let raw = h.engine.tick();
        let events = h.surfaces.apply(raw);
        let dismissed = events
            .iter()
            .filter(|e| matches!(e, Event::SurfaceDismissed { .. }))
            .count();
        assert_eq!(dismissed, 1);
        assert!(!h.surfaces.is_showing("social"));
        assert!(!h.presenter.is_visible("social"));

        let again = h.surfaces.apply(h.engine.expire("social"));
        assert!(again.is_empty());
    }

    #[test]
    fn stop_dismisses_surface() {
        let mut h = harness();
        let block = start(&mut h, "social", 60_000);
        h.surfaces.show(&mut h.engine, &block).unwrap();

        let stopped = h.engine.stop("social");
        let events = h.surfaces.apply(stopped);
        assert!(matches!(
            &events[..],
            [Event::BlockStopped { .. }, Event::SurfaceDismissed { .. }]
        ));
    }

    #[test]
    fn gestures_swallow_or_reassert() {
        let mut h = harness();
        let block = start(&mut h, "social", 60_000);
        h.surfaces.show(&mut h.engine, &block).unwrap();

        assert!(h.surfaces.gesture("social", Gesture::Back, T0).is_empty());
        let home = h.surfaces.gesture("social", Gesture::Home, T0);
        assert!(matches!(&home[..], [Event::SurfaceReasserted { .. }]));
        assert!(h
            .presenter
            .calls()
            .contains(&PresenterCall::BringToFront("social".into())));
        assert!(h.surfaces.is_showing("social"));
        assert!(h.surfaces.gesture("unknown", Gesture::Home, T0).is_empty());
    }

    #[test]
    fn teardown_keeps_subscription_while_active() {
        let mut h = harness();
        let block = start(&mut h, "social", 60_000);
        h.surfaces.show(&mut h.engine, &block).unwrap();

        assert!(h.surfaces.teardown(&mut h.engine, "social"));
        assert!(h.engine.listeners().contains("social"));

        let events = h.surfaces.recreate_if_needed(&mut h.engine, "social").unwrap();
        assert!(matches!(events[0], Event::SurfaceShown { .. }));
        assert!(h.surfaces.is_showing("social"));
    }

    #[test]
    fn teardown_after_expiry_drops_subscription() {
        let mut h = harness();
        h.engine.subscribe("gone");
        assert!(!h.surfaces.teardown(&mut h.engine, "gone"));
        assert!(!h.engine.listeners().contains("gone"));
    }

    #[test]
    fn recreate_from_durable_only_record_uses_fallback_name() {
        let mut h = harness();
        h.store
            .put(&CountdownRecord::new("com.example.video", 30_000, h.clock.now_ms(), None))
            .unwrap();

        let events = h
            .surfaces
            .recreate_if_needed(&mut h.engine, "com.example.video")
            .unwrap();
        assert!(matches!(
            &events[0],
            Event::SurfaceShown { display_name, remaining_ms: 30_000, .. } if display_name == "video"
        ));
    }

    #[test]
    fn presenter_failure_leaves_no_surface() {
        let mut h = harness();
        let block = start(&mut h, "social", 60_000);
        h.presenter.fail_show(true);

        assert!(h.surfaces.show(&mut h.engine, &block).is_err());
        assert!(!h.surfaces.is_showing("social"));

        h.presenter.fail_show(false);
        assert!(h.surfaces.show(&mut h.engine, &block).is_ok());
        assert!(h.surfaces.is_showing("social"));
    }

    #[test]
    fn dismiss_all_clears_every_surface() {
        let mut h = harness();
        let a = start(&mut h, "a", 60_000);
        let b = start(&mut h, "b", 60_000);
        h.surfaces.show(&mut h.engine, &a).unwrap();
        h.surfaces.show(&mut h.engine, &b).unwrap();

        assert_eq!(h.surfaces.dismiss_all(T0).len(), 2);
        assert!(h.surfaces.is_empty());
        assert!(!h.presenter.is_visible("a"));
    }
}
