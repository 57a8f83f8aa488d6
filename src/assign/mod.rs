//! Project assignment. Rules pair a pattern with a project; the matcher resolves an
//! observed signal to at most one project using them. Matching is pure: the rule
//! snapshot is supplied by the caller and results depend only on it and the input.

pub mod matcher;
pub mod rules;
