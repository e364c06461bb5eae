//! Processing status and log pollers
//!
//! Both pollers run on a fixed interval, never overlap a poll with itself,
//! and stop when their handle is cancelled or dropped.

use crate::backend::AnalyticsBackend;
use crate::config::PollConfig;
use crate::state_machine::{Event, PollSource};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Owns the pollers of one session. Dropping the handle stops them.
#[derive(Debug)]
pub struct PollHandle {
    token: CancellationToken,
}

impl PollHandle {
    /// Spawn a status poller and a log poller for `session_id`
    pub fn spawn<B>(
        backend: Arc<B>,
        session_id: &str,
        config: &PollConfig,
        event_tx: mpsc::Sender<Event>,
    ) -> Self
    where
        B: AnalyticsBackend + ?Sized + 'static,
    {
        let token = CancellationToken::new();

        let status_backend = backend.clone();
        let status_id = session_id.to_string();
        tokio::spawn(poll_loop(
            PollSource::Status,
            config.status_interval,
            token.clone(),
            event_tx.clone(),
            move || {
                let backend = status_backend.clone();
                let session_id = status_id.clone();
                async move {
                    match backend.processing_status(&session_id).await {
                        Ok(snapshot) => {
                            let done = snapshot.status.is_terminal();
                            (Event::StatusPolled(snapshot), done)
                        }
                        Err(error) => (
                            Event::PollFailed {
                                source: PollSource::Status,
                                error,
                            },
                            false,
                        ),
                    }
                }
            },
        ));

        let log_id = session_id.to_string();
        tokio::spawn(poll_loop(
            PollSource::Logs,
            config.log_interval,
            token.clone(),
            event_tx,
            move || {
                let backend = backend.clone();
                let session_id = log_id.clone();
                async move {
                    let event = match backend.processing_logs(&session_id).await {
                        Ok(logs) => Event::LogsPolled(logs),
                        Err(error) => Event::PollFailed {
                            source: PollSource::Logs,
                            error,
                        },
                    };
                    (event, false)
                }
            },
        ));

        tracing::debug!(session_id = %session_id, "Pollers started");
        Self { token }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Run `poll` every `period` until cancelled, the runtime goes away, or a
/// poll reports it was the last one.
async fn poll_loop<F, Fut>(
    source: PollSource,
    period: Duration,
    token: CancellationToken,
    event_tx: mpsc::Sender<Event>,
    mut poll: F,
) where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = (Event, bool)> + Send,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        // The next tick is only awaited once this poll resolves
        let (event, last) = tokio::select! {
            biased;
            () = token.cancelled() => break,
            polled = poll() => polled,
        };

        if event_tx.send(event).await.is_err() || last {
            break;
        }
    }

    tracing::debug!(?source, "Poller stopped");
}
