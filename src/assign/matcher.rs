use std::sync::Arc;

use super::rules::{DomainRule, KeywordRule, ProjectId, RepositoryRule};

/// Result of a successful match. `matched` carries the literal rule pattern that
/// fired so callers can show why an observation landed in a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub project: ProjectId,
    pub matched: Arc<str>,
}

/// Resolves a browsed host against domain rules.
///
/// Both the host and the rule pattern are normalized with [normalize_host]. A rule
/// matches when the host equals the pattern or ends with `"." + pattern`, so
/// `gist.github.com` matches `github.com` while `evilgithub.com` does not. When
/// several rules match, the earliest-created one wins regardless of slice order.
pub fn match_domain(domain: &str, rules: &[DomainRule]) -> Option<Assignment> {
    let host = normalize_host(domain);
    if host.is_empty() {
        return None;
    }

    first_created(rules.iter().filter(|rule| {
        let pattern = normalize_host(&rule.domain);
        !pattern.is_empty() && host_matches(&host, &pattern)
    }))
    .map(|rule| Assignment {
        project: rule.project,
        matched: rule.domain.clone(),
    })
}

/// Resolves a calendar event against keyword rules.
///
/// A rule matches when its keyword is contained, case-insensitively, in the title
/// or the description. An event with no text matches nothing; that is a normal
/// outcome, not an error. First created rule wins.
pub fn match_calendar_event(
    title: &str,
    description: &str,
    rules: &[KeywordRule],
) -> Option<Assignment> {
    if title.is_empty() && description.is_empty() {
        return None;
    }
    let title = title.to_lowercase();
    let description = description.to_lowercase();

    first_created(rules.iter().filter(|rule| {
        let keyword = rule.keyword.to_lowercase();
        // an empty keyword would be contained in everything
        !keyword.is_empty() && (title.contains(&keyword) || description.contains(&keyword))
    }))
    .map(|rule| Assignment {
        project: rule.project,
        matched: rule.keyword.clone(),
    })
}

/// Resolves repository activity against repository rules.
///
/// Repository identifiers are exact `owner/repo` slugs, so comparison is whole-string
/// equality, never substring. Hosting services treat slugs case-insensitively and so
/// does this. First created rule wins.
pub fn match_repository(repository: &str, rules: &[RepositoryRule]) -> Option<Assignment> {
    let repository = repository.trim();
    if repository.is_empty() {
        return None;
    }

    first_created(
        rules
            .iter()
            .filter(|rule| repository.eq_ignore_ascii_case(rule.repository.trim())),
    )
    .map(|rule| Assignment {
        project: rule.project,
        matched: rule.repository.clone(),
    })
}

/// Lowercases a host, drops surrounding whitespace, a single trailing dot and a
/// single leading `www.`.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim().to_lowercase();
    let host = host.strip_suffix('.').unwrap_or(&host);
    let host = host.strip_prefix("www.").unwrap_or(host);
    host.to_string()
}

/// Exact or label-boundary suffix comparison of two already normalized hosts.
fn host_matches(host: &str, pattern: &str) -> bool {
    if host == pattern {
        return true;
    }
    host.len() > pattern.len()
        && host.ends_with(pattern)
        && host.as_bytes()[host.len() - pattern.len() - 1] == b'.'
}

trait Sequenced {
    fn seq(&self) -> u64;
}

impl Sequenced for DomainRule {
    fn seq(&self) -> u64 {
        self.seq
    }
}

impl Sequenced for KeywordRule {
    fn seq(&self) -> u64 {
        self.seq
    }
}

impl Sequenced for RepositoryRule {
    fn seq(&self) -> u64 {
        self.seq
    }
}

/// First-match-wins tie-break: out of all matching rules pick the one created
/// earliest. Selecting by minimal sequence keeps the result independent of the
/// order rules arrive in.
fn first_created<'r, R: Sequenced>(matching: impl Iterator<Item = &'r R>) -> Option<&'r R> {
    matching.min_by_key(|rule| rule.seq())
}

#[cfg(test)]
mod tests {
    use crate::assign::rules::{DomainRule, KeywordRule, ProjectId, RepositoryRule};

    use super::{match_calendar_event, match_domain, match_repository, normalize_host};

    fn domain_rule(project: u64, domain: &str, seq: u64) -> DomainRule {
        DomainRule {
            project: ProjectId(project),
            domain: domain.into(),
            seq,
        }
    }

    fn keyword_rule(project: u64, keyword: &str, seq: u64) -> KeywordRule {
        KeywordRule {
            project: ProjectId(project),
            keyword: keyword.into(),
            seq,
        }
    }

    fn repository_rule(project: u64, repository: &str, seq: u64) -> RepositoryRule {
        RepositoryRule {
            project: ProjectId(project),
            repository: repository.into(),
            seq,
        }
    }

    #[test]
    fn test_domain_exact_match() {
        let rules = [domain_rule(1, "github.com", 0)];
        let found = match_domain("github.com", &rules).unwrap();
        assert_eq!(found.project, ProjectId(1));
        assert_eq!(&*found.matched, "github.com");
    }

    #[test]
    fn test_domain_subdomain_matches_on_label_boundary() {
        let rules = [domain_rule(1, "github.com", 0)];
        assert!(match_domain("gist.github.com", &rules).is_some());
    }

    #[test]
    fn test_domain_suffix_without_label_boundary_is_rejected() {
        // "evilgithub.com" ends with "github.com" but is a different registrable name
        let rules = [domain_rule(1, "github.com", 0)];
        assert_eq!(match_domain("evilgithub.com", &rules), None);

        let rules = [domain_rule(1, "hub.com", 0)];
        assert_eq!(match_domain("github.com", &rules), None);
        assert!(match_domain("git.hub.com", &rules).is_some());
    }

    #[test]
    fn test_domain_normalization() {
        let rules = [domain_rule(1, "Example.org", 0)];
        assert!(match_domain("www.example.org", &rules).is_some());
        assert!(match_domain("EXAMPLE.ORG.", &rules).is_some());
        assert_eq!(normalize_host(" www.Example.Org. "), "example.org");
    }

    #[test]
    fn test_domain_tie_break_is_creation_order() {
        // both rules match docs.rs, the older one has to win
        let rules = [
            domain_rule(2, "docs.rs", 7),
            domain_rule(1, "rs", 3),
        ];
        let found = match_domain("docs.rs", &rules).unwrap();
        assert_eq!(found.project, ProjectId(1));
    }

    #[test]
    fn test_domain_empty_input_and_empty_rules() {
        let rules = [domain_rule(1, "github.com", 0), domain_rule(2, "", 1)];
        assert_eq!(match_domain("", &rules), None);
        assert_eq!(match_domain("unrelated.net", &rules), None);
    }

    #[test]
    fn test_keyword_first_match_wins_over_later_longer_rule() {
        let rules = [
            keyword_rule(1, "nfi", 0),
            keyword_rule(2, "nfi-backend", 1),
        ];
        let found = match_calendar_event("NFI Backend sync", "", &rules).unwrap();
        assert_eq!(found.project, ProjectId(1));
        assert_eq!(&*found.matched, "nfi");
    }

    #[test]
    fn test_keyword_order_of_slice_does_not_matter() {
        let forward = [keyword_rule(1, "sync", 0), keyword_rule(2, "weekly", 1)];
        let backward = [keyword_rule(2, "weekly", 1), keyword_rule(1, "sync", 0)];
        let a = match_calendar_event("weekly sync", "", &forward);
        let b = match_calendar_event("weekly sync", "", &backward);
        assert_eq!(a, b);
        assert_eq!(a.unwrap().project, ProjectId(1));
    }

    #[test]
    fn test_keyword_case_insensitive() {
        let rules = [keyword_rule(1, "Standup", 0)];
        assert!(match_calendar_event("daily standup notes", "", &rules).is_some());
    }

    #[test]
    fn test_keyword_matches_description() {
        let rules = [keyword_rule(1, "retro", 0)];
        let found = match_calendar_event("Team meeting", "sprint retro board", &rules);
        assert!(found.is_some());
    }

    #[test]
    fn test_empty_event_matches_nothing() {
        let rules = [keyword_rule(1, "anything", 0)];
        assert_eq!(match_calendar_event("", "", &rules), None);
    }

    #[test]
    fn test_blank_keyword_never_matches() {
        let rules = [keyword_rule(1, "", 0)];
        assert_eq!(match_calendar_event("some title", "", &rules), None);
    }

    #[test]
    fn test_matching_is_deterministic() {
        let rules = [
            keyword_rule(1, "plan", 4),
            keyword_rule(2, "planning", 9),
        ];
        let first = match_calendar_event("Planning session", "", &rules);
        let second = match_calendar_event("Planning session", "", &rules);
        assert_eq!(first, second);
    }

    #[test]
    fn test_repository_exact_equality_only() {
        let rules = [repository_rule(1, "acme/api", 0)];
        assert!(match_repository("acme/api", &rules).is_some());
        // identifiers are exact, substring containment must not fire
        assert_eq!(match_repository("acme/api-gateway", &rules), None);
        assert_eq!(match_repository("other-acme/api", &rules), None);
    }

    #[test]
    fn test_repository_case_insensitive() {
        let rules = [repository_rule(1, "Acme/API", 0)];
        assert!(match_repository("acme/api", &rules).is_some());
    }

    #[test]
    fn test_repository_tie_break_is_creation_order() {
        let rules = [
            repository_rule(2, "acme/api", 5),
            repository_rule(1, "acme/api", 2),
        ];
        assert_eq!(
            match_repository("acme/api", &rules).unwrap().project,
            ProjectId(1)
        );
    }
}
