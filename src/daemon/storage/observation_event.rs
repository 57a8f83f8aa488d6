use chrono::{DateTime, Utc};

use crate::daemon::collection::source::SignalEvent;

/// A signal on its way from the collector to the processor, stamped with the
/// collection time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservationEvent {
    pub signal: SignalEvent,
    pub timestamp: DateTime<Utc>,
}
