use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::format::{format_remaining, surface_title, AdvisoryBand};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum SurfaceState {
    Hidden,
    Showing { remaining_ms: u64 },
}

/// User-initiated attempts to leave the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gesture {
    Back,
    Home,
    TaskSwitch,
    FocusLost,
    Menu,
}

impl FromStr for Gesture {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "back" => Ok(Gesture::Back),
            "home" => Ok(Gesture::Home),
            "task_switch" | "recents" => Ok(Gesture::TaskSwitch),
            "focus_lost" => Ok(Gesture::FocusLost),
            "menu" => Ok(Gesture::Menu),
            other => Err(format!("unknown gesture: {other}")),
        }
    }
}

impl fmt::Display for Gesture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Gesture::Back => "back",
            Gesture::Home => "home",
            Gesture::TaskSwitch => "task_switch",
            Gesture::FocusLost => "focus_lost",
            Gesture::Menu => "menu",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureOutcome {
    /// Consumed without any visible effect.
    Swallowed,
    /// The surface must be brought back to the foreground.
    Reasserted,
    /// The surface is hidden; nothing to intercept.
    Ignored,
}

/// Result of feeding a countdown update into a surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceUpdate {
    Redraw(SurfaceView),
    Expired,
    Ignored,
}

/// Everything a presenter needs to draw one frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceView {
    pub entity_id: String,
    pub title: String,
    pub countdown: String,
    pub message: String,
}

/// Blocking surface for a single entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockingSurface {
    pub entity_id: String,
    pub display_name: String,
    /// Expiry of the block this surface was created for.
    pub expiry_ms: u64,
    state: SurfaceState,
}

impl BlockingSurface {
    /// Enter `Showing`. Returns `None` unless the block still has time left.
    pub fn enter(
        entity_id: impl Into<String>,
        display_name: impl Into<String>,
        expiry_ms: u64,
        remaining_ms: u64,
    ) -> Option<Self> {
        if remaining_ms == 0 {
            return None;
        }
        Some(Self {
            entity_id: entity_id.into(),
            display_name: display_name.into(),
            expiry_ms,
            state: SurfaceState::Showing { remaining_ms },
        })
    }

    pub fn state(&self) -> SurfaceState {
        self.state
    }

    pub fn is_showing(&self) -> bool {
        matches!(self.state, SurfaceState::Showing { .. })
    }

    /// A remaining time of 0 is the `Expired` transition.
    pub fn on_tick(&mut self, remaining_ms: u64) -> SurfaceUpdate {
        if !self.is_showing() {
            return SurfaceUpdate::Ignored;
        }
        if remaining_ms == 0 {
            return if self.on_expired() {
                SurfaceUpdate::Expired
            } else {
                SurfaceUpdate::Ignored
            };
        }
        self.state = SurfaceState::Showing { remaining_ms };
        match self.view() {
            Some(view) => SurfaceUpdate::Redraw(view),
            None => SurfaceUpdate::Ignored,
        }
    }

    /// Transition to `Hidden`. Returns `true` only on the first call.
    pub fn on_expired(&mut self) -> bool {
        if !self.is_showing() {
            return false;
        }
        self.state = SurfaceState::Hidden;
        true
    }

    pub fn on_gesture(&self, gesture: Gesture) -> GestureOutcome {
        if !self.is_showing() {
            return GestureOutcome::Ignored;
        }
        match gesture {
            Gesture::Back | Gesture::Menu => GestureOutcome::Swallowed,
            Gesture::Home | Gesture::TaskSwitch | Gesture::FocusLost => GestureOutcome::Reasserted,
        }
    }

    pub fn view(&self) -> Option<SurfaceView> {
        match self.state {
            SurfaceState::Hidden => None,
            SurfaceState::Showing { remaining_ms } => Some(SurfaceView {
                entity_id: self.entity_id.clone(),
                title: surface_title(&self.display_name),
                countdown: format_remaining(remaining_ms),
                message: AdvisoryBand::for_remaining(remaining_ms).message().to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface(remaining_ms: u64) -> BlockingSurface {
        BlockingSurface::enter("com.example.social", "Social", 1_000_000, remaining_ms)
            .expect("active surface")
    }

    #[test]
    fn entry_requires_remaining_time() {
        assert!(BlockingSurface::enter("app", "App", 0, 0).is_none());
        assert!(surface(1).is_showing());
    }

    #[test]
    fn tick_redraws_with_banded_message() {
        let mut s = surface(400_000);
        assert_eq!(
            s.on_tick(299_000),
            SurfaceUpdate::Redraw(SurfaceView {
                entity_id: "com.example.social".into(),
                title: "Social is Blocked".into(),
                countdown: "04:59".into(),
                message: "Almost there! Just a little longer...".into(),
            })
        );
        assert_eq!(s.state(), SurfaceState::Showing { remaining_ms: 299_000 });
    }

    #[test]
    fn expiry_hides_exactly_once() {
        let mut s = surface(1_000);
        assert_eq!(s.on_tick(0), SurfaceUpdate::Expired);
        assert_eq!(s.on_tick(0), SurfaceUpdate::Ignored);
        assert!(!s.on_expired());
        assert_eq!(s.view(), None);
    }

    #[test]
    fn gestures_never_hide_the_surface() {
        let s = surface(10_000);
        assert_eq!(s.on_gesture(Gesture::Back), GestureOutcome::Swallowed);
        assert_eq!(s.on_gesture(Gesture::Menu), GestureOutcome::Swallowed);
        assert_eq!(s.on_gesture(Gesture::Home), GestureOutcome::Reasserted);
        assert_eq!(s.on_gesture(Gesture::TaskSwitch), GestureOutcome::Reasserted);
        assert_eq!(s.on_gesture(Gesture::FocusLost), GestureOutcome::Reasserted);
        assert!(s.is_showing());

        let mut hidden = surface(10_000);
        hidden.on_expired();
        assert_eq!(hidden.on_gesture(Gesture::Home), GestureOutcome::Ignored);
    }

    #[test]
    fn gestures_parse_from_cli_spelling() {
        assert_eq!("task-switch".parse::<Gesture>(), Ok(Gesture::TaskSwitch));
        assert_eq!("FOCUS_LOST".parse::<Gesture>(), Ok(Gesture::FocusLost));
        assert!("swipe".parse::<Gesture>().is_err());
        assert_eq!(Gesture::TaskSwitch.to_string(), "task_switch");
    }
}
