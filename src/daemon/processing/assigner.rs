use anyhow::Result;
use tracing::{debug, warn};

use crate::{
    assign::{
        matcher::{match_calendar_event, match_domain, match_repository, Assignment},
        rules::RuleSet,
    },
    daemon::{
        collection::source::SignalEvent,
        storage::{
            entities::ObservationEntity,
            observation_event::ObservationEvent,
            observation_log::{DayFileHandle, ObservationLog},
            rule_store::RuleStore,
        },
    },
    utils::clock::Clock,
};

use super::module::EventProcessor;

/// Routes a signal to the matcher that handles its kind.
pub fn assign_signal(signal: &SignalEvent, rules: &RuleSet) -> Option<Assignment> {
    match signal {
        SignalEvent::DomainVisit { domain } => match_domain(domain, &rules.domains),
        SignalEvent::CalendarEvent { title, description } => {
            match_calendar_event(title, description, &rules.keywords)
        }
        SignalEvent::RepositoryActivity { repository } => {
            match_repository(repository, &rules.repositories)
        }
    }
}

/// The saving stage of the daemon. Resolves each observation to a project against
/// the current rule snapshot and appends it to the day file, rolling the file over
/// at UTC midnight.
pub struct AssigningSaver<L: ObservationLog> {
    log: L,
    rules: RuleStore,
    current_handle: Option<L::DayFile>,
    clock: Box<dyn Clock>,
}

impl<L: ObservationLog> AssigningSaver<L> {
    pub fn new(log: L, rules: RuleStore, clock: Box<dyn Clock>) -> Self {
        Self {
            log,
            rules,
            current_handle: None,
            clock,
        }
    }

    /// A rule snapshot miss must not lose the observation, it degrades to "stored
    /// unassigned" and a later reassign pass can fix it up.
    fn snapshot_or_empty(&self) -> RuleSet {
        match self.rules.snapshot() {
            Ok(rules) => rules,
            Err(e) => {
                warn!("Can't load assignment rules, storing observation unassigned: {e:?}");
                RuleSet::default()
            }
        }
    }

    async fn take_day_handle(&mut self) -> Result<L::DayFile> {
        let today = self.clock.now().date_naive();
        match self.current_handle.take() {
            Some(handle) if handle.date() == today => Ok(handle),
            Some(mut stale) => {
                stale.flush().await?;
                self.log.open_day(today).await
            }
            None => self.log.open_day(today).await,
        }
    }
}

impl<L: ObservationLog> EventProcessor for AssigningSaver<L> {
    async fn process_next(&mut self, event: ObservationEvent) -> Result<()> {
        let rules = self.snapshot_or_empty();
        let assignment = assign_signal(&event.signal, &rules);
        debug!("Resolved {:?} to {:?}", event.signal, assignment);

        let entity = ObservationEntity::from_event(event, assignment);

        let mut handle = self.take_day_handle().await?;
        let result = handle.append(vec![entity]).await;
        self.current_handle = Some(handle);
        result
    }

    async fn finalize(&mut self) -> Result<()> {
        if let Some(v) = self.current_handle.as_mut() {
            v.flush().await?;
        }
        Ok(())
    }
}

/// Re-runs the matcher over every stored observation with the supplied rule set
/// and rewrites days whose assignments changed. Returns the amount of updated
/// observations. Running it twice with the same rules is a no-op the second time.
pub async fn reapply_assignments(log: &impl ObservationLog, rules: &RuleSet) -> Result<u64> {
    let mut changed = 0u64;
    for day in log.days().await? {
        let mut observations = log.read_day(day).await?;
        let mut day_changed = false;
        for observation in &mut observations {
            let assignment = assign_signal(&observation.signal, rules);
            if observation.set_assignment(assignment) {
                day_changed = true;
                changed += 1;
            }
        }
        if day_changed {
            debug!("Rewriting assignments for {day}");
            log.replace_day(day, observations).await?;
        }
    }
    Ok(changed)
}
