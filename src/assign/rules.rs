use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Identifier of a project. Allocated by the rule store and never reused.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ProjectId(pub u64);

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: Arc<str>,
}

/// Matches browsed hosts. `domain` is stored as entered, normalization happens
/// during matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRule {
    pub project: ProjectId,
    pub domain: Arc<str>,
    pub seq: u64,
}

/// Matches calendar events by substring containment in title or description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRule {
    pub project: ProjectId,
    pub keyword: Arc<str>,
    pub seq: u64,
}

/// Matches repository activity by the exact `owner/repo` identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRule {
    pub project: ProjectId,
    pub repository: Arc<str>,
    pub seq: u64,
}

/// In-memory snapshot of every rule. `seq` values are allocated from one counter
/// across all three kinds, so creation order is total.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub domains: Vec<DomainRule>,
    #[serde(default)]
    pub keywords: Vec<KeywordRule>,
    #[serde(default)]
    pub repositories: Vec<RepositoryRule>,
}

impl RuleSet {
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty() && self.keywords.is_empty() && self.repositories.is_empty()
    }

    /// Drops every rule belonging to `project`. Returns the amount removed.
    pub fn remove_project_rules(&mut self, project: ProjectId) -> usize {
        let before =
            self.domains.len() + self.keywords.len() + self.repositories.len();
        self.domains.retain(|r| r.project != project);
        self.keywords.retain(|r| r.project != project);
        self.repositories.retain(|r| r.project != project);
        before - (self.domains.len() + self.keywords.len() + self.repositories.len())
    }

    /// Drops the rule with the given creation sequence, whatever its kind.
    pub fn remove_seq(&mut self, seq: u64) -> bool {
        let before =
            self.domains.len() + self.keywords.len() + self.repositories.len();
        self.domains.retain(|r| r.seq != seq);
        self.keywords.retain(|r| r.seq != seq);
        self.repositories.retain(|r| r.seq != seq);
        before != self.domains.len() + self.keywords.len() + self.repositories.len()
    }
}
