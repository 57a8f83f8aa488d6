//!  Storage is organized around two artifacts:
//!   - [observation_log::ObservationLogImpl] keeps assigned observations, one json
//!     line each, in a file per UTC day.
//!   - [rule_store::RuleStore] keeps projects and assignment rules in a single
//!     json document rewritten atomically on every change.

pub mod entities;
pub mod observation_event;
pub mod observation_log;
pub mod rule_store;
