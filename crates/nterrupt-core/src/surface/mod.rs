//! Full-screen blocking surface.
//!
//! [`BlockingSurface`] is the per-entity state machine
//! (`Hidden -> Showing -> Hidden`), [`SurfaceManager`] keeps one surface per
//! blocked entity and drives the host [`Presenter`](crate::host::Presenter).

mod format;
mod manager;
mod state;

pub use format::{format_remaining, surface_title, AdvisoryBand};
pub use manager::SurfaceManager;
pub use state::{BlockingSurface, Gesture, GestureOutcome, SurfaceState, SurfaceUpdate, SurfaceView};
