//! The per-ticket monitoring loop.
//!
//! One `TicketMonitor` runs for every open ticket. Each poll cycle it
//! re-reads the ticket from the store, suspends the deadline clock outside
//! working hours, announces remaining-minute thresholds at most once each,
//! and auto-closes the ticket when the SLA breaches. Poll cycles within a
//! monitor are strictly sequential, which is what makes the announced-set
//! correct without any locking: it is private to this one task.

use std::{collections::HashSet, sync::Arc, time::Duration};

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::{
    calendar::WorkingCalendar,
    clock::DeadlineClock,
    models::Ticket,
    notification::Notifier,
    persistence::{error::PersistenceError, traits::TicketRepository},
};

/// A cancellable monitoring task bound to a single open ticket.
pub struct TicketMonitor {
    ticket_id: i64,
    chat_id: i64,
    store: Arc<dyn TicketRepository>,
    notifier: Arc<dyn Notifier>,
    calendar: Arc<WorkingCalendar>,
    clock: Arc<DeadlineClock>,
    /// The chat that receives warnings and breach notices.
    audience: i64,
    poll_interval: Duration,
    cancel: CancellationToken,
    /// Thresholds already announced for this ticket. Owned exclusively by
    /// this monitor and discarded with it.
    notified: HashSet<i64>,
}

impl TicketMonitor {
    /// Creates a monitor for the given ticket.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ticket_id: i64,
        chat_id: i64,
        store: Arc<dyn TicketRepository>,
        notifier: Arc<dyn Notifier>,
        calendar: Arc<WorkingCalendar>,
        clock: Arc<DeadlineClock>,
        audience: i64,
        poll_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            ticket_id,
            chat_id,
            store,
            notifier,
            calendar,
            clock,
            audience,
            poll_interval,
            cancel,
            notified: HashSet::new(),
        }
    }

    /// Runs the monitor until the ticket closes, the SLA breaches, or the
    /// monitor is cancelled.
    ///
    /// Transient store errors never terminate the loop: a monitor that dies
    /// silently while its ticket is open would let a breach go undetected.
    pub async fn run(mut self) {
        tracing::debug!(
            ticket_id = self.ticket_id,
            chat_id = self.chat_id,
            "Ticket monitor started."
        );

        loop {
            if self.cancel.is_cancelled() {
                tracing::debug!(ticket_id = self.ticket_id, "Ticket monitor cancelled.");
                break;
            }

            let ticket = match self.store.get_ticket(self.ticket_id).await {
                Ok(Some(ticket)) => ticket,
                Ok(None) => {
                    tracing::debug!(
                        ticket_id = self.ticket_id,
                        "Ticket no longer exists, stopping monitor."
                    );
                    break;
                }
                Err(error) => {
                    tracing::warn!(
                        ticket_id = self.ticket_id,
                        error = %error,
                        "Transient store error, retrying on next poll."
                    );
                    if self.sleep(self.poll_interval).await {
                        break;
                    }
                    continue;
                }
            };

            if ticket.is_closed {
                // Closed by a staff reply, /close, or a prior cycle. Whoever
                // closed it owns any closure notification.
                tracing::debug!(
                    ticket_id = self.ticket_id,
                    "Ticket closed externally, stopping monitor."
                );
                break;
            }

            let now = Utc::now();
            if !self.calendar.is_working_instant(now) {
                let resume_at = self.calendar.next_working_period_start(now);
                let pause = (resume_at - now).to_std().unwrap_or(Duration::ZERO);
                tracing::debug!(
                    ticket_id = self.ticket_id,
                    resume_at = %resume_at,
                    "Outside working hours, suspending deadline clock."
                );
                if self.sleep(pause).await {
                    break;
                }
                continue;
            }

            let remaining = self.clock.remaining_minutes(ticket.created_at, now);

            if DeadlineClock::is_breached(remaining) {
                match self.handle_breach(&ticket).await {
                    Ok(()) => break,
                    Err(error) => {
                        tracing::warn!(
                            ticket_id = self.ticket_id,
                            error = %error,
                            "Failed to finalize breached ticket, retrying on next poll."
                        );
                        if self.sleep(self.poll_interval).await {
                            break;
                        }
                        continue;
                    }
                }
            }

            if let Some(threshold) = self.clock.crossed_threshold(remaining, &self.notified) {
                self.announce_threshold(&ticket, threshold).await;
                self.notified.insert(threshold);
            }

            if self.sleep(self.poll_interval).await {
                break;
            }
        }

        tracing::debug!(
            ticket_id = self.ticket_id,
            chat_id = self.chat_id,
            "Ticket monitor stopped."
        );
    }

    /// Flags the ticket overdue, closes it as a system action, and emits the
    /// breach notification.
    ///
    /// Overdue is flagged before the close so that a failed close is
    /// re-detected as a breach on the next cycle.
    async fn handle_breach(&self, ticket: &Ticket) -> Result<(), PersistenceError> {
        self.store.mark_overdue(ticket.id).await?;
        self.store.close_ticket(ticket.id, None).await?;
        tracing::info!(
            ticket_id = ticket.id,
            chat_id = ticket.chat_id,
            "SLA breached, ticket auto-closed."
        );

        let text = format!(
            "🔴 SLA breached for the ticket in chat \"{}\".\nThe ticket has been closed and marked overdue.",
            ticket.title
        );
        if let Err(error) = self.notifier.broadcast(self.audience, &text).await {
            tracing::error!(
                ticket_id = ticket.id,
                error = %error,
                "Failed to deliver breach notification."
            );
        }
        Ok(())
    }

    /// Emits a warning that `threshold` working minutes remain.
    ///
    /// Delivery failures are logged and swallowed; the threshold still counts
    /// as announced so the clock never blocks on the notification channel.
    async fn announce_threshold(&self, ticket: &Ticket, threshold: i64) {
        tracing::info!(ticket_id = ticket.id, threshold, "SLA threshold reached.");
        let text = format!(
            "🔴 SLA warning: {} working minutes left for the ticket in chat \"{}\".\nClose it with /close \"{}\"",
            threshold, ticket.title, ticket.title
        );
        if let Err(error) = self.notifier.broadcast(self.audience, &text).await {
            tracing::error!(
                ticket_id = ticket.id,
                error = %error,
                "Failed to deliver threshold notification."
            );
        }
    }

    /// Cancellable sleep; returns `true` when the monitor was cancelled.
    async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => true,
            _ = tokio::time::sleep(duration) => false,
        }
    }
}
