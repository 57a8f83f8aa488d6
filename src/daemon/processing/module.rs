use anyhow::Result;

use crate::daemon::storage::observation_event::ObservationEvent;

/// Represents an observation processor. This should realistically be able to
/// abstract over different sinks: local storage, an export target.
pub trait EventProcessor {
    fn process_next(
        &mut self,
        event: ObservationEvent,
    ) -> impl std::future::Future<Output = Result<()>>;

    fn finalize(&mut self) -> impl std::future::Future<Output = Result<()>>;
}
