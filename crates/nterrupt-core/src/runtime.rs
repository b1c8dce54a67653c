//! Tokio actor hosting a [`BlockService`].
//!
//! A single task owns the service, so every state transition runs on one
//! logical worker. Control calls, one-shot wake-ups, refresh ticks and
//! presence polls all arrive as commands on the same channel and are handled
//! in order. Events fan out on a broadcast channel.
//!
//! While nothing is blocked the poll interval drives a reconciliation pass
//! instead, so blocks started by another process are adopted.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::clock::Clock;
use crate::countdown::CountdownEngine;
use crate::error::{CoreError, HostError, Result, ValidationError};
use crate::events::Event;
use crate::host::{ForegroundProbe, Presenter, WakeScheduler};
use crate::monitor::PresenceMonitor;
use crate::service::BlockService;
use crate::storage::{Config, CountdownStore};
use crate::surface::{Gesture, SurfaceManager};

const EVENT_CAPACITY: usize = 256;

/// Host collaborators handed to the actor.
pub struct ServiceParts {
    pub store: Box<dyn CountdownStore>,
    pub presenter: Box<dyn Presenter>,
    pub probe: Box<dyn ForegroundProbe>,
    pub clock: Arc<dyn Clock>,
}

enum Command {
    Start {
        entity_id: String,
        display_name: String,
        duration_ms: u64,
        reply: oneshot::Sender<std::result::Result<Vec<Event>, ValidationError>>,
    },
    Stop {
        entity_id: String,
        reply: oneshot::Sender<Vec<Event>>,
    },
    Remaining {
        entity_id: String,
        reply: oneshot::Sender<u64>,
    },
    Active {
        entity_id: String,
        reply: oneshot::Sender<bool>,
    },
    Snapshot {
        reply: oneshot::Sender<Event>,
    },
    Status {
        reply: oneshot::Sender<String>,
    },
    Gesture {
        entity_id: String,
        gesture: Gesture,
        reply: oneshot::Sender<Vec<Event>>,
    },
    Wake(String),
    Refresh,
    Shutdown,
}

// ── Wake scheduler ───────────────────────────────────────────────────

/// Wake-ups as spawned tokio timers that post commands back to the actor.
pub struct TokioWakeScheduler {
    commands: mpsc::UnboundedSender<Command>,
    clock: Arc<dyn Clock>,
    one_shots: BTreeMap<String, JoinHandle<()>>,
    repeating: Option<JoinHandle<()>>,
}

impl TokioWakeScheduler {
    fn new(commands: mpsc::UnboundedSender<Command>, clock: Arc<dyn Clock>) -> Self {
        Self {
            commands,
            clock,
            one_shots: BTreeMap::new(),
            repeating: None,
        }
    }

    fn handle() -> std::result::Result<Handle, HostError> {
        Handle::try_current().map_err(|e| HostError::Unavailable(e.to_string()))
    }
}

impl WakeScheduler for TokioWakeScheduler {
    fn schedule_one_shot(&mut self, entity_id: &str, at_ms: u64) -> std::result::Result<(), HostError> {
        let handle = Self::handle()?;
        self.one_shots.retain(|_, task| !task.is_finished());
        let delay = Duration::from_millis(at_ms.saturating_sub(self.clock.now_ms()));
        let commands = self.commands.clone();
        let id = entity_id.to_string();
        let task = handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = commands.send(Command::Wake(id));
        });
        if let Some(previous) = self.one_shots.insert(entity_id.to_string(), task) {
            previous.abort();
        }
        Ok(())
    }

    fn cancel_one_shot(&mut self, entity_id: &str) {
        if let Some(task) = self.one_shots.remove(entity_id) {
            task.abort();
        }
    }

    fn schedule_repeating(&mut self, interval_ms: u64) -> std::result::Result<(), HostError> {
        let handle = Self::handle()?;
        let period = Duration::from_millis(interval_ms.max(1));
        let commands = self.commands.clone();
        let task = handle.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if commands.send(Command::Refresh).is_err() {
                    break;
                }
            }
        });
        if let Some(previous) = self.repeating.replace(task) {
            previous.abort();
        }
        Ok(())
    }

    fn cancel_repeating(&mut self) {
        if let Some(task) = self.repeating.take() {
            task.abort();
        }
    }
}

impl Drop for TokioWakeScheduler {
    fn drop(&mut self) {
        for task in self.one_shots.values() {
            task.abort();
        }
        self.cancel_repeating();
    }
}

// ── Handle ───────────────────────────────────────────────────────────

/// Client side of the blocker actor. Clones talk to the same actor.
#[derive(Clone)]
pub struct BlockerHandle {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<Event>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

/// Start the actor on the current tokio runtime. Durable state is
/// recovered before the first command is handled.
pub fn spawn(parts: ServiceParts, config: &Config) -> BlockerHandle {
    let (commands, receiver) = mpsc::unbounded_channel();
    let (events, _) = broadcast::channel(EVENT_CAPACITY);

    let scheduler = TokioWakeScheduler::new(commands.clone(), parts.clock.clone());
    let engine = CountdownEngine::new(parts.store, Box::new(scheduler), parts.clock, &config.engine);
    let monitor = PresenceMonitor::new(parts.probe, &config.monitor);
    let service = BlockService::new(engine, SurfaceManager::new(parts.presenter), monitor);

    let task = tokio::spawn(run(service, receiver, events.clone()));
    BlockerHandle {
        commands,
        events,
        task: Arc::new(Mutex::new(Some(task))),
    }
}

impl BlockerHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub async fn start_block(
        &self,
        entity_id: &str,
        display_name: &str,
        duration_ms: u64,
    ) -> Result<Vec<Event>> {
        let events = self
            .request(|reply| Command::Start {
                entity_id: entity_id.to_string(),
                display_name: display_name.to_string(),
                duration_ms,
                reply,
            })
            .await??;
        Ok(events)
    }

    pub async fn stop_block(&self, entity_id: &str) -> Result<Vec<Event>> {
        self.request(|reply| Command::Stop {
            entity_id: entity_id.to_string(),
            reply,
        })
        .await
    }

    pub async fn query_remaining(&self, entity_id: &str) -> Result<u64> {
        self.request(|reply| Command::Remaining {
            entity_id: entity_id.to_string(),
            reply,
        })
        .await
    }

    pub async fn query_active(&self, entity_id: &str) -> Result<bool> {
        self.request(|reply| Command::Active {
            entity_id: entity_id.to_string(),
            reply,
        })
        .await
    }

    pub async fn snapshot(&self) -> Result<Event> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    pub async fn status_line(&self) -> Result<String> {
        self.request(|reply| Command::Status { reply }).await
    }

    pub async fn gesture(&self, entity_id: &str, gesture: Gesture) -> Result<Vec<Event>> {
        self.request(|reply| Command::Gesture {
            entity_id: entity_id.to_string(),
            gesture,
            reply,
        })
        .await
    }

    /// Stop the actor and wait for it to finish. Later calls from any
    /// clone return immediately.
    pub async fn shutdown(&self) -> Result<()> {
        let _ = self.commands.send(Command::Shutdown);
        let task = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        match task {
            Some(task) => task
                .await
                .map_err(|e| CoreError::Custom(format!("Blocker task failed: {e}"))),
            None => Ok(()),
        }
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .map_err(|_| CoreError::Custom("Blocker service is not running".into()))?;
        response
            .await
            .map_err(|_| CoreError::Custom("Blocker service dropped the request".into()))
    }
}

// ── Actor loop ───────────────────────────────────────────────────────

async fn run(
    mut service: BlockService,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: broadcast::Sender<Event>,
) {
    let poll_period = Duration::from_millis(service.monitor().poll_interval_ms());
    let mut poll = tokio::time::interval_at(Instant::now() + poll_period, poll_period);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

    publish(&events, service.recover());
    tracing::info!("Blocker service running: {}", service.status_line());

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                None | Some(Command::Shutdown) => break,
                Some(command) => {
                    let produced = handle_command(&mut service, command);
                    publish(&events, produced);
                }
            },
            _ = poll.tick() => {
                let produced = if service.monitor().is_armed() {
                    service.poll_presence()
                } else {
                    service.reconcile()
                };
                publish(&events, produced);
            }
        }
    }

    publish(&events, service.shutdown());
    tracing::info!("Blocker service stopped");
}

fn handle_command(service: &mut BlockService, command: Command) -> Vec<Event> {
    match command {
        Command::Start {
            entity_id,
            display_name,
            duration_ms,
            reply,
        } => {
            let result = service.start_block(&entity_id, &display_name, duration_ms);
            let produced = result.clone().unwrap_or_default();
            let _ = reply.send(result);
            produced
        }
        Command::Stop { entity_id, reply } => {
            let produced = service.stop_block(&entity_id);
            let _ = reply.send(produced.clone());
            produced
        }
        Command::Remaining { entity_id, reply } => {
            let _ = reply.send(service.query_remaining(&entity_id));
            Vec::new()
        }
        Command::Active { entity_id, reply } => {
            let _ = reply.send(service.query_active(&entity_id));
            Vec::new()
        }
        Command::Snapshot { reply } => {
            let _ = reply.send(service.snapshot());
            Vec::new()
        }
        Command::Status { reply } => {
            let _ = reply.send(service.status_line());
            Vec::new()
        }
        Command::Gesture {
            entity_id,
            gesture,
            reply,
        } => {
            let produced = service.gesture(&entity_id, gesture);
            let _ = reply.send(produced.clone());
            produced
        }
        Command::Wake(entity_id) => service.wake(&entity_id),
        Command::Refresh => service.refresh(),
        // Handled by the loop.
        Command::Shutdown => Vec::new(),
    }
}

fn publish(events: &broadcast::Sender<Event>, produced: Vec<Event>) {
    for event in produced {
        // No receivers is fine; events are notifications, not state.
        let _ = events.send(event);
    }
}
