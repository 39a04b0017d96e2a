//! This module provides the `SupervisorBuilder` for constructing a
//! `MonitorSupervisor`.

use std::sync::{atomic::AtomicU64, Arc};

use dashmap::DashMap;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{MonitorSupervisor, SupervisorError};
use crate::{
    calendar::WorkingCalendar, clock::DeadlineClock, config::AppConfig, notification::Notifier,
    persistence::traits::TicketRepository,
};

/// A builder for creating a `MonitorSupervisor` instance.
#[derive(Default)]
pub struct SupervisorBuilder {
    config: Option<AppConfig>,
    store: Option<Arc<dyn TicketRepository>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl SupervisorBuilder {
    /// Creates a new, empty `SupervisorBuilder`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the application configuration for the supervisor.
    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the ticket store shared by all monitors.
    pub fn store(mut self, store: Arc<dyn TicketRepository>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the notification sink shared by all monitors.
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Assembles and validates the components to build a `MonitorSupervisor`.
    ///
    /// The working calendar and the deadline clock are constructed here, so
    /// an unusable calendar configuration fails the build rather than
    /// surfacing inside a running monitor.
    pub fn build(self) -> Result<MonitorSupervisor, SupervisorError> {
        let config = self.config.ok_or(SupervisorError::MissingConfig)?;
        let store = self.store.ok_or(SupervisorError::MissingStore)?;
        let notifier = self.notifier.ok_or(SupervisorError::MissingNotifier)?;

        let calendar = Arc::new(WorkingCalendar::new(
            config.sla.calendar_timezone,
            config.sla.weekday_window,
            config.sla.weekend_window,
        )?);
        let clock = Arc::new(DeadlineClock::new(
            Arc::clone(&calendar),
            config.sla.sla_minutes,
            &config.sla.thresholds,
        ));

        Ok(MonitorSupervisor {
            config: Arc::new(config),
            store,
            notifier,
            calendar,
            clock,
            active: Arc::new(DashMap::new()),
            tracker: TaskTracker::new(),
            root: CancellationToken::new(),
            next_generation: AtomicU64::new(0),
        })
    }
}
