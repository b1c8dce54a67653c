//! # Nterrupt Core Library
//!
//! Core logic for Nterrupt, an app blocker that shows a full-screen,
//! dismiss-proof countdown over blocked applications until their block ends.
//! The CLI binary and any GUI host are thin layers over this crate.
//!
//! ## Architecture
//!
//! - **Countdown Engine**: wall-clock countdowns derived from a fixed expiry
//!   timestamp. The host delivers one-shot wake-ups and refresh ticks.
//! - **Block Registry**: in-memory blocks backed by a durable
//!   remaining-time store (SQLite) so countdowns survive process restarts
//! - **Presence Monitor**: polls the host for the focused entity and shows
//!   its blocking surface
//! - **Blocking Surface**: per-entity surface state machine that swallows or
//!   re-asserts every dismissal gesture
//! - **Runtime**: tokio actor owning all of the above behind a handle
//!
//! ## Key Components
//!
//! - [`CountdownEngine`]: countdown state machine
//! - [`BlockService`]: control surface over engine, surfaces and monitor
//! - [`SqliteCountdownStore`]: durable countdown persistence
//! - [`Config`]: application configuration management

pub mod block;
pub mod clock;
pub mod countdown;
pub mod error;
pub mod events;
pub mod host;
pub mod monitor;
pub mod runtime;
pub mod service;
pub mod storage;
pub mod surface;

pub use block::{BlockRegistry, BlockedEntity, CountdownSnapshot};
pub use clock::{Clock, ManualClock, SystemClock};
pub use countdown::{CountdownEngine, EngineState};
pub use error::{ConfigError, CoreError, HostError, StoreError, ValidationError};
pub use events::Event;
pub use host::{DismissTarget, ForegroundProbe, Presenter, WakeScheduler};
pub use monitor::PresenceMonitor;
pub use runtime::{BlockerHandle, ServiceParts};
pub use service::BlockService;
pub use storage::{Config, CountdownRecord, CountdownStore, MemoryCountdownStore, SqliteCountdownStore};
pub use surface::{Gesture, SurfaceManager, SurfaceView};
