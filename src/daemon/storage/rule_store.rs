use std::{
    path::{Path, PathBuf},
    sync::Mutex,
    time::SystemTime,
};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::assign::rules::{
    DomainRule, KeywordRule, Project, ProjectId, RepositoryRule, RuleSet,
};

/// Everything the rule store persists: projects, rules, and the counters the next
/// identifier and creation sequence come from. Sequences are allocated from one
/// counter across all rule kinds, which is what makes first-match-wins total.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleBook {
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub rules: RuleSet,
    #[serde(default)]
    next_project_id: u64,
    #[serde(default)]
    next_seq: u64,
}

impl RuleBook {
    pub fn project(&self, id: ProjectId) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }

    pub fn project_name(&self, id: ProjectId) -> String {
        self.project(id)
            .map(|p| p.name.to_string())
            .unwrap_or_else(|| format!("project #{id}"))
    }

    fn allocate_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

const RULES_FILE: &str = "rules.json";

/// Persistence for projects and assignment rules. Every mutation rewrites the
/// json document through a temp file and a rename, concurrent readers (the daemon
/// polls this while the cli edits it) never observe a partial document.
pub struct RuleStore {
    path: PathBuf,
    snapshot_cache: Mutex<Option<(SystemTime, RuleSet)>>,
}

impl RuleStore {
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;

        Ok(Self {
            path: dir.join(RULES_FILE),
            snapshot_cache: Mutex::new(None),
        })
    }

    pub fn load(&self) -> Result<RuleBook> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("Rule file {:?} holds invalid json", self.path)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RuleBook::default()),
            Err(e) => Err(e).context(format!("Can't read rule file {:?}", self.path)),
        }
    }

    /// Rule snapshot for matching, re-read only when the file changed on disk.
    pub fn snapshot(&self) -> Result<RuleSet> {
        let modified = std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .ok();

        let mut cache = self.snapshot_cache.lock().unwrap();
        if let (Some(modified), Some((cached_at, rules))) = (modified, cache.as_ref()) {
            if modified == *cached_at {
                return Ok(rules.clone());
            }
        }

        let rules = self.load()?.rules;
        if let Some(modified) = modified {
            *cache = Some((modified, rules.clone()));
        }
        debug!("Reloaded rule snapshot from {:?}", self.path);
        Ok(rules)
    }

    pub fn add_project(&self, name: &str) -> Result<Project> {
        let name = name.trim();
        if name.is_empty() {
            bail!("Project name can't be empty");
        }
        self.mutate(|book| {
            if book.projects.iter().any(|p| &*p.name == name) {
                bail!("Project {name} already exists");
            }
            let project = Project {
                id: ProjectId(book.next_project_id),
                name: name.into(),
            };
            book.next_project_id += 1;
            book.projects.push(project.clone());
            Ok(project)
        })
    }

    /// Removes a project together with every rule pointing at it.
    pub fn remove_project(&self, id: ProjectId) -> Result<Project> {
        self.mutate(|book| {
            let Some(position) = book.projects.iter().position(|p| p.id == id) else {
                bail!("No project with id {id}");
            };
            let project = book.projects.remove(position);
            let dropped = book.rules.remove_project_rules(id);
            debug!("Removed project {} and {dropped} of its rules", project.name);
            Ok(project)
        })
    }

    pub fn add_domain_rule(&self, project: ProjectId, domain: &str) -> Result<DomainRule> {
        let domain = non_empty_pattern(domain, "Domain")?;
        self.mutate(|book| {
            ensure_project(book, project)?;
            let rule = DomainRule {
                project,
                domain: domain.as_str().into(),
                seq: book.allocate_seq(),
            };
            book.rules.domains.push(rule.clone());
            Ok(rule)
        })
    }

    pub fn add_keyword_rule(&self, project: ProjectId, keyword: &str) -> Result<KeywordRule> {
        let keyword = non_empty_pattern(keyword, "Keyword")?;
        self.mutate(|book| {
            ensure_project(book, project)?;
            let rule = KeywordRule {
                project,
                keyword: keyword.as_str().into(),
                seq: book.allocate_seq(),
            };
            book.rules.keywords.push(rule.clone());
            Ok(rule)
        })
    }

    pub fn add_repository_rule(
        &self,
        project: ProjectId,
        repository: &str,
    ) -> Result<RepositoryRule> {
        let repository = non_empty_pattern(repository, "Repository")?;
        self.mutate(|book| {
            ensure_project(book, project)?;
            let rule = RepositoryRule {
                project,
                repository: repository.as_str().into(),
                seq: book.allocate_seq(),
            };
            book.rules.repositories.push(rule.clone());
            Ok(rule)
        })
    }

    /// Removes the rule with the given creation sequence, whatever its kind.
    pub fn remove_rule(&self, seq: u64) -> Result<bool> {
        self.mutate(|book| Ok(book.rules.remove_seq(seq)))
    }

    fn mutate<T>(&self, operation: impl FnOnce(&mut RuleBook) -> Result<T>) -> Result<T> {
        let mut book = self.load()?;
        let result = operation(&mut book)?;
        self.save(&book)?;
        Ok(result)
    }

    fn save(&self, book: &RuleBook) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(book)?)?;
        std::fs::rename(&tmp, &self.path)?;
        // the cached mtime can collide with a fast successive write
        self.snapshot_cache.lock().unwrap().take();
        Ok(())
    }
}

fn ensure_project(book: &RuleBook, id: ProjectId) -> Result<()> {
    if book.project(id).is_none() {
        bail!("No project with id {id}");
    }
    Ok(())
}

fn non_empty_pattern(pattern: &str, kind: &str) -> Result<String> {
    let pattern = pattern.trim();
    if pattern.is_empty() {
        bail!("{kind} pattern can't be empty");
    }
    Ok(pattern.to_string())
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tempfile::tempdir;

    use crate::assign::rules::ProjectId;

    use super::RuleStore;

    #[test]
    fn test_projects_round_trip() -> Result<()> {
        let dir = tempdir()?;
        let store = RuleStore::open(dir.path())?;

        let oss = store.add_project("oss")?;
        let work = store.add_project("work")?;
        assert_ne!(oss.id, work.id);

        let reopened = RuleStore::open(dir.path())?;
        assert_eq!(reopened.load()?.projects, vec![oss, work]);
        Ok(())
    }

    #[test]
    fn test_duplicate_and_empty_project_names_are_rejected() -> Result<()> {
        let dir = tempdir()?;
        let store = RuleStore::open(dir.path())?;

        store.add_project("oss")?;
        assert!(store.add_project("oss").is_err());
        assert!(store.add_project("  ").is_err());
        Ok(())
    }

    #[test]
    fn test_sequence_is_shared_across_rule_kinds() -> Result<()> {
        let dir = tempdir()?;
        let store = RuleStore::open(dir.path())?;
        let project = store.add_project("oss")?;

        let domain = store.add_domain_rule(project.id, "github.com")?;
        let keyword = store.add_keyword_rule(project.id, "rustc")?;
        let repository = store.add_repository_rule(project.id, "rust-lang/rust")?;

        assert_eq!(
            vec![domain.seq, keyword.seq, repository.seq],
            vec![0, 1, 2]
        );
        Ok(())
    }

    #[test]
    fn test_rules_require_an_existing_project() -> Result<()> {
        let dir = tempdir()?;
        let store = RuleStore::open(dir.path())?;
        assert!(store.add_domain_rule(ProjectId(42), "github.com").is_err());
        assert!(store.add_keyword_rule(ProjectId(42), "sync").is_err());
        Ok(())
    }

    #[test]
    fn test_removing_a_project_drops_its_rules() -> Result<()> {
        let dir = tempdir()?;
        let store = RuleStore::open(dir.path())?;
        let oss = store.add_project("oss")?;
        let work = store.add_project("work")?;

        store.add_domain_rule(oss.id, "github.com")?;
        let kept = store.add_keyword_rule(work.id, "review")?;

        store.remove_project(oss.id)?;
        let book = store.load()?;
        assert!(book.rules.domains.is_empty());
        assert_eq!(book.rules.keywords, vec![kept]);
        Ok(())
    }

    #[test]
    fn test_removed_rule_does_not_free_its_sequence() -> Result<()> {
        let dir = tempdir()?;
        let store = RuleStore::open(dir.path())?;
        let project = store.add_project("oss")?;

        let first = store.add_domain_rule(project.id, "github.com")?;
        assert!(store.remove_rule(first.seq)?);
        assert!(!store.remove_rule(first.seq)?);

        let second = store.add_domain_rule(project.id, "docs.rs")?;
        assert!(second.seq > first.seq);
        Ok(())
    }

    #[test]
    fn test_snapshot_follows_mutations() -> Result<()> {
        let dir = tempdir()?;
        let store = RuleStore::open(dir.path())?;
        let project = store.add_project("oss")?;

        assert!(store.snapshot()?.domains.is_empty());
        store.add_domain_rule(project.id, "github.com")?;
        assert_eq!(store.snapshot()?.domains.len(), 1);
        Ok(())
    }
}
