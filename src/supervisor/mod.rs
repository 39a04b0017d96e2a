//! The Supervisor module manages the lifecycle of the Warden application.
//!
//! It owns the set of active per-ticket monitors: it starts one when a ticket
//! opens, guarantees at most one monitor per chat, and ensures monitors
//! terminate when their ticket closes by any path. It also runs the
//! long-lived services (update ingestion, the weekly reporter), listens for
//! shutdown signals, and orchestrates a clean shutdown in which no monitor is
//! orphaned mid-sleep.

mod builder;

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

pub use builder::SupervisorBuilder;
use dashmap::DashMap;
use thiserror::Error;
use tokio::signal;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    calendar::{CalendarError, WorkingCalendar},
    clock::DeadlineClock,
    config::AppConfig,
    ingest::Ingestor,
    monitor::TicketMonitor,
    notification::Notifier,
    persistence::{error::PersistenceError, traits::TicketRepository},
    report::WeeklyReporter,
};

/// Represents the set of errors that can occur during the supervisor's
/// operation.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// A required configuration was not provided to the `SupervisorBuilder`.
    #[error("Missing configuration for Supervisor")]
    MissingConfig,

    /// A ticket store was not provided to the `SupervisorBuilder`.
    #[error("Missing ticket store for Supervisor")]
    MissingStore,

    /// A notifier was not provided to the `SupervisorBuilder`.
    #[error("Missing notifier for Supervisor")]
    MissingNotifier,

    /// The configured calendar is unusable.
    #[error("Calendar configuration error: {0}")]
    Calendar(#[from] CalendarError),

    /// An error occurred while talking to the ticket store.
    #[error("Ticket store error: {0}")]
    Persistence(#[from] PersistenceError),
}

/// A cancellation handle for one running ticket monitor.
///
/// The generation guards set removal: a terminating monitor only removes the
/// entry it registered, never a successor's.
struct MonitorHandle {
    token: CancellationToken,
    generation: u64,
}

/// The primary runtime manager for the application.
///
/// Owns the `ActiveMonitorSet` mapping each chat to its running monitor, and
/// supervises the long-lived ingestion and reporting tasks once `run` is
/// called.
pub struct MonitorSupervisor {
    /// Shared application configuration.
    config: Arc<AppConfig>,

    /// The ticket store shared by all monitors.
    store: Arc<dyn TicketRepository>,

    /// The notification sink shared by all monitors.
    notifier: Arc<dyn Notifier>,

    /// The working calendar driving every deadline clock.
    calendar: Arc<WorkingCalendar>,

    /// The deadline clock evaluated by every monitor.
    clock: Arc<DeadlineClock>,

    /// At most one live entry per chat; an entry is removed exactly once,
    /// when its monitor terminates.
    active: Arc<DashMap<i64, MonitorHandle>>,

    /// Tracks every spawned monitor so shutdown can await them all.
    tracker: TaskTracker,

    /// The root token; each monitor gets a child of it.
    root: CancellationToken,

    /// Source of generation numbers for monitor handles.
    next_generation: AtomicU64,
}

impl MonitorSupervisor {
    /// Returns a new `SupervisorBuilder` instance.
    ///
    /// This is the public entry point for creating a supervisor.
    pub fn builder() -> SupervisorBuilder {
        SupervisorBuilder::new()
    }

    /// A clone of the root cancellation token, for wiring sibling services.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.root.clone()
    }

    /// The number of currently active ticket monitors.
    pub fn active_monitor_count(&self) -> usize {
        self.active.len()
    }

    /// Whether a monitor is currently running for the given chat.
    pub fn is_monitoring(&self, chat_id: i64) -> bool {
        self.active.contains_key(&chat_id)
    }

    /// Cancels the monitor for a chat, if one is running.
    ///
    /// The monitor observes the cancellation at its next suspension or poll
    /// boundary and deregisters itself; the ticket itself is not touched.
    pub fn cancel_monitor(&self, chat_id: i64) -> bool {
        match self.active.get(&chat_id) {
            Some(handle) => {
                handle.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Starts a monitor for a freshly opened ticket.
    ///
    /// Idempotent: if a live monitor already exists for the chat this is a
    /// no-op, which guards against duplicate spawn races.
    pub fn on_ticket_opened(&self, ticket_id: i64, chat_id: i64) {
        if self.root.is_cancelled() {
            tracing::debug!(chat_id, ticket_id, "Shutdown in progress, not spawning monitor.");
            return;
        }

        match self.active.entry(chat_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                tracing::debug!(chat_id, ticket_id, "Monitor already active for chat.");
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let token = self.root.child_token();
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                slot.insert(MonitorHandle { token: token.clone(), generation });

                let monitor = TicketMonitor::new(
                    ticket_id,
                    chat_id,
                    Arc::clone(&self.store),
                    Arc::clone(&self.notifier),
                    Arc::clone(&self.calendar),
                    Arc::clone(&self.clock),
                    self.config.telegram.notification_chat_id,
                    self.config.sla.poll_interval_secs,
                    token,
                );

                let active = Arc::clone(&self.active);
                self.tracker.spawn(async move {
                    // The monitor runs in its own task so a panic terminates
                    // only this one monitor; the wrapper still deregisters it.
                    if let Err(error) = tokio::spawn(monitor.run()).await {
                        tracing::error!(
                            chat_id,
                            ticket_id,
                            error = %error,
                            "Ticket monitor terminated abnormally."
                        );
                    }
                    active.remove_if(&chat_id, |_, handle| handle.generation == generation);
                });

                tracing::info!(chat_id, ticket_id, "Ticket monitor spawned.");
            }
        }
    }

    /// Spawns a monitor for every currently open ticket.
    ///
    /// Used at startup: timer state is not persisted, so monitors are
    /// reconstructed from open-ticket state with an empty announced set. An
    /// already-passed threshold may therefore re-announce once.
    pub async fn restore_monitors(&self) -> Result<usize, SupervisorError> {
        let open = self.store.get_open_tickets().await?;
        let count = open.len();
        for ticket in open {
            self.on_ticket_opened(ticket.id, ticket.chat_id);
        }
        Ok(count)
    }

    /// Cancels every active monitor, awaits their termination, and clears
    /// the active set.
    pub async fn shutdown(&self) {
        tracing::info!("Cancelling all active ticket monitors.");
        self.root.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        self.active.clear();
        tracing::info!("All ticket monitors have terminated.");
    }

    /// Starts the supervisor and its managed services.
    ///
    /// Spawns the signal handler, the update ingestor and the weekly
    /// reporter, then supervises task health until cancellation. On shutdown
    /// it awaits every monitor, bounded by the configured timeout.
    pub async fn run(
        self: Arc<Self>,
        ingestor: Ingestor,
        reporter: WeeklyReporter,
    ) -> Result<(), SupervisorError> {
        let mut join_set = tokio::task::JoinSet::new();

        // Spawn a task to listen for shutdown signals.
        let cancellation_token = self.root.clone();
        join_set.spawn(async move {
            let ctrl_c = signal::ctrl_c();
            #[cfg(unix)]
            let terminate = async {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                    }
                    Err(error) => {
                        tracing::error!(error = %error, "Failed to register SIGTERM handler.");
                        std::future::pending::<()>().await;
                    }
                }
            };
            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => tracing::info!("SIGINT (Ctrl+C) received, initiating graceful shutdown."),
                _ = terminate => tracing::info!("SIGTERM received, initiating graceful shutdown."),
            }

            // Notify all other tasks to begin shutting down.
            cancellation_token.cancel();
        });

        join_set.spawn(ingestor.run());
        join_set.spawn(reporter.run());

        // Supervise task health and the shutdown signal.
        loop {
            tokio::select! {
                maybe_result = join_set.join_next() => {
                    match maybe_result {
                        Some(Ok(())) => {
                            // Task completed, continue monitoring the rest.
                        }
                        Some(Err(error)) => {
                            tracing::error!(error = %error, "A critical task failed. Initiating shutdown.");
                            self.root.cancel();
                        }
                        None => break,
                    }
                }
                _ = self.root.cancelled() => break,
            }
        }

        // Graceful shutdown: every monitor must observe cancellation at its
        // next suspension point, within one poll interval.
        tracing::info!("Starting graceful shutdown of ticket monitors...");
        let shutdown_timeout = self.config.shutdown_timeout_secs;
        if tokio::time::timeout(shutdown_timeout, self.shutdown()).await.is_err() {
            tracing::warn!(
                "Monitors did not terminate within {:?}. Continuing shutdown.",
                shutdown_timeout
            );
        }

        join_set.shutdown().await;
        tracing::info!("Supervisor shutdown complete.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        persistence::traits::MockTicketRepository,
        test_helpers::{test_app_config, RecordingNotifier, TicketBuilder},
    };

    fn supervisor_with(store: MockTicketRepository) -> Arc<MonitorSupervisor> {
        let supervisor = MonitorSupervisor::builder()
            .config(test_app_config("sqlite::memory:"))
            .store(Arc::new(store))
            .notifier(RecordingNotifier::new())
            .build()
            .unwrap();
        Arc::new(supervisor)
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached within one second");
    }

    #[tokio::test]
    async fn duplicate_open_events_spawn_a_single_monitor() {
        let mut store = MockTicketRepository::new();
        let ticket = TicketBuilder::new().id(1).chat_id(10).build();
        store.expect_get_ticket().returning(move |_| Ok(Some(ticket.clone())));

        let supervisor = supervisor_with(store);
        supervisor.on_ticket_opened(1, 10);
        supervisor.on_ticket_opened(1, 10);

        assert_eq!(supervisor.active_monitor_count(), 1);
        assert!(supervisor.is_monitoring(10));

        supervisor.shutdown().await;
        assert_eq!(supervisor.active_monitor_count(), 0);
    }

    #[tokio::test]
    async fn monitor_deregisters_after_external_close() {
        let mut store = MockTicketRepository::new();
        let closed = TicketBuilder::new().id(1).chat_id(10).closed().build();
        store.expect_get_ticket().returning(move |_| Ok(Some(closed.clone())));

        let supervisor = supervisor_with(store);
        supervisor.on_ticket_opened(1, 10);

        let supervisor_ref = Arc::clone(&supervisor);
        wait_for(move || !supervisor_ref.is_monitoring(10)).await;

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn monitors_for_different_chats_are_independent() {
        let mut store = MockTicketRepository::new();
        let open = TicketBuilder::new().id(2).chat_id(20).build();
        store.expect_get_ticket().returning(move |ticket_id| {
            if ticket_id == 1 {
                // Chat 10's ticket is already closed.
                Ok(Some(TicketBuilder::new().id(1).chat_id(10).closed().build()))
            } else {
                Ok(Some(open.clone()))
            }
        });

        let supervisor = supervisor_with(store);
        supervisor.on_ticket_opened(1, 10);
        supervisor.on_ticket_opened(2, 20);

        let supervisor_ref = Arc::clone(&supervisor);
        wait_for(move || !supervisor_ref.is_monitoring(10)).await;
        assert!(supervisor.is_monitoring(20));

        supervisor.shutdown().await;
        assert_eq!(supervisor.active_monitor_count(), 0);
    }

    #[tokio::test]
    async fn restore_spawns_monitors_for_open_tickets() {
        let mut store = MockTicketRepository::new();
        store.expect_get_open_tickets().times(1).returning(|| {
            Ok(vec![
                TicketBuilder::new().id(1).chat_id(10).build(),
                TicketBuilder::new().id(2).chat_id(20).build(),
            ])
        });
        store.expect_get_ticket().returning(|ticket_id| {
            Ok(Some(TicketBuilder::new().id(ticket_id).chat_id(ticket_id * 10).build()))
        });

        let supervisor = supervisor_with(store);
        let restored = supervisor.restore_monitors().await.unwrap();

        assert_eq!(restored, 2);
        assert_eq!(supervisor.active_monitor_count(), 2);

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn cancel_monitor_stops_one_chat_only() {
        let mut store = MockTicketRepository::new();
        store.expect_get_ticket().returning(|ticket_id| {
            Ok(Some(TicketBuilder::new().id(ticket_id).chat_id(ticket_id * 10).build()))
        });

        let supervisor = supervisor_with(store);
        supervisor.on_ticket_opened(1, 10);
        supervisor.on_ticket_opened(2, 20);

        assert!(supervisor.cancel_monitor(10));
        let supervisor_ref = Arc::clone(&supervisor);
        wait_for(move || !supervisor_ref.is_monitoring(10)).await;
        assert!(supervisor.is_monitoring(20));

        // Nothing to cancel for an unknown chat.
        assert!(!supervisor.cancel_monitor(999));

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn no_monitors_spawn_after_shutdown() {
        let store = MockTicketRepository::new();
        let supervisor = supervisor_with(store);

        supervisor.shutdown().await;
        supervisor.on_ticket_opened(1, 10);

        assert_eq!(supervisor.active_monitor_count(), 0);
    }
}
