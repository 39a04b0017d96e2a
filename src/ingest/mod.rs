//! Update ingestion: pulls chat messages from a transport and feeds them to
//! the intake service.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{intake::IntakeService, models::ChatMessage};

mod telegram;

pub use telegram::TelegramUpdateSource;

/// Delay before retrying after a failed update poll.
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Custom error type for update-source operations.
#[derive(Debug, Error)]
pub enum IngestError {
    /// An error from the underlying `reqwest` HTTP client.
    #[error("Request error: {0}")]
    RequestError(#[from] reqwest::Error),

    /// The messenger API rejected the poll request.
    #[error("API error: {0}")]
    ApiError(String),
}

/// A source of incoming chat messages.
///
/// `next_batch` blocks (long-polls) until messages arrive or the transport's
/// timeout elapses, returning an empty batch in the latter case.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Fetches the next batch of chat messages.
    async fn next_batch(&mut self) -> Result<Vec<ChatMessage>, IngestError>;
}

/// The long-running service that drains an [`UpdateSource`] into the
/// [`IntakeService`].
pub struct Ingestor {
    source: Box<dyn UpdateSource>,
    intake: Arc<IntakeService>,
    cancellation_token: CancellationToken,
}

impl Ingestor {
    /// Creates a new Ingestor instance.
    pub fn new(
        source: Box<dyn UpdateSource>,
        intake: Arc<IntakeService>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self { source, intake, cancellation_token }
    }

    /// Starts the long-running ingestion loop.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                biased;

                _ = self.cancellation_token.cancelled() => {
                    tracing::info!("Ingestor cancellation signal received, shutting down...");
                    break;
                }

                batch = self.source.next_batch() => match batch {
                    Ok(messages) => {
                        for message in &messages {
                            if let Err(error) = self.intake.handle_message(message).await {
                                tracing::error!(
                                    chat_id = message.chat_id,
                                    error = %error,
                                    "Failed to process chat message."
                                );
                            }
                        }
                    }
                    Err(error) => {
                        tracing::error!(error = %error, "Update poll failed. Retrying after delay...");
                        tokio::select! {
                            _ = self.cancellation_token.cancelled() => break,
                            _ = tokio::time::sleep(POLL_ERROR_BACKOFF) => {}
                        }
                    }
                }
            }
        }
        tracing::info!("Ingestor has shut down.");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mockall::Sequence;

    use super::*;
    use crate::{
        persistence::traits::{MockStaffRepository, MockTicketRepository},
        supervisor::MonitorSupervisor,
        test_helpers::{test_app_config, ChatMessageBuilder, RecordingNotifier},
    };

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn run_drains_batches_into_intake_until_cancelled() {
        let mut source = MockUpdateSource::new();
        let mut seq = Sequence::new();
        source.expect_next_batch().times(1).in_sequence(&mut seq).returning(|| {
            Ok(vec![ChatMessageBuilder::new()
                .chat_id(1000)
                .private()
                .sender_id(1000)
                .text("/start")
                .build()])
        });
        source.expect_next_batch().returning(|| Ok(vec![]));

        let mut staff = MockStaffRepository::new();
        staff.expect_role_of().returning(|_| Ok(None));

        let notifier = RecordingNotifier::new();
        let supervisor = Arc::new(
            MonitorSupervisor::builder()
                .config(test_app_config("sqlite::memory:"))
                .store(Arc::new(MockTicketRepository::new()))
                .notifier(notifier.clone())
                .build()
                .unwrap(),
        );
        let intake = Arc::new(crate::intake::IntakeService::new(
            Arc::new(MockTicketRepository::new()),
            Arc::new(staff),
            notifier.clone(),
            supervisor,
            -1,
        ));

        let cancel = CancellationToken::new();
        let ingestor = Ingestor::new(Box::new(source), intake, cancel.clone());
        let handle = tokio::spawn(ingestor.run());

        // The /start command from an unregistered user produces a reply.
        for _ in 0..100 {
            if !notifier.sent().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(notifier.sent_containing("not registered").len(), 1);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("ingestor must stop on cancellation")
            .unwrap();
    }
}
