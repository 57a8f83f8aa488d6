use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    daemon::storage::observation_event::ObservationEvent, utils::clock::Clock,
};

use super::source::SignalSource;

/// Polls the signal source on a fixed cadence and feeds timestamped observations
/// into the processing channel.
pub struct SignalCollectionModule {
    next: mpsc::Sender<ObservationEvent>,
    source: Box<dyn SignalSource>,
    shutdown: CancellationToken,
    poll_interval: Duration,
    clock: Box<dyn Clock>,
}

impl SignalCollectionModule {
    pub fn new(
        next: mpsc::Sender<ObservationEvent>,
        source: Box<dyn SignalSource>,
        shutdown: CancellationToken,
        poll_interval: Duration,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            next,
            source,
            shutdown,
            poll_interval,
            clock,
        }
    }

    fn collect(&mut self) -> Result<Vec<ObservationEvent>> {
        let timestamp = self.clock.now();
        let signals = self.source.poll_signals()?;

        Ok(signals
            .into_iter()
            .map(|signal| ObservationEvent { signal, timestamp })
            .collect())
    }

    /// Executes the collection event loop until shutdown is requested.
    pub async fn run(mut self) -> Result<()> {
        let mut poll_point = self.clock.instant();
        loop {
            poll_point += self.poll_interval;

            match self.collect() {
                Ok(events) => {
                    let sent = events.len();
                    for event in events {
                        debug!("Sending observation {:?}", event);
                        self.next
                            .send(event)
                            .await
                            .inspect_err(|e| error!("Unexpected error during sending {e:?}"))?;
                    }
                    if sent > 0 {
                        info!("Forwarded {sent} observations")
                    }
                }
                Err(e) => {
                    error!("Encountered an error during collection {:?}", e)
                }
            }

            tokio::select! {
                // Cancelation stops the event loop. The sender gets dropped with it,
                // which in turn ends the processing module.
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                _ = self.clock.sleep_until(poll_point) => ()
            }
        }
    }
}
