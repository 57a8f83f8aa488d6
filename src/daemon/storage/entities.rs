use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    assign::{matcher::Assignment, rules::ProjectId},
    daemon::collection::source::SignalEvent,
};

use super::observation_event::ObservationEvent;

/// The struct used for storing observations on disk. Besides the raw signal it
/// carries the assignment outcome, so reports never have to re-run the matcher and
/// the reason for an assignment stays visible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationEntity {
    #[serde(flatten)]
    pub signal: SignalEvent,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectId>,
    /// The literal rule pattern that produced the assignment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_pattern: Option<Arc<str>>,
}

impl ObservationEntity {
    pub fn from_event(event: ObservationEvent, assignment: Option<Assignment>) -> Self {
        let mut entity = Self {
            signal: event.signal,
            timestamp: event.timestamp,
            project: None,
            matched_pattern: None,
        };
        entity.set_assignment(assignment);
        entity
    }

    /// Overwrites the assignment outcome. Returns whether anything changed, which
    /// lets rule re-application skip untouched days.
    pub fn set_assignment(&mut self, assignment: Option<Assignment>) -> bool {
        let (project, matched_pattern) = match assignment {
            Some(v) => (Some(v.project), Some(v.matched)),
            None => (None, None),
        };
        let changed = self.project != project || self.matched_pattern != matched_pattern;
        self.project = project;
        self.matched_pattern = matched_pattern;
        changed
    }
}
