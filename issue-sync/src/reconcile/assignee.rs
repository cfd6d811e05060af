//! Resolving upstream assignees to tracker users.

use crate::identity::IdentityLookup;
use crate::intermediary::{Issue, UpstreamUser};
use crate::tracker::{DirectoryUser, Ticket, Tracker, TrackerError};
use tracing::{debug, info, warn};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Strips diacritics: NFD decomposition with combining marks removed.
pub(crate) fn fold_diacritics(text: &str) -> String {
    text.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

fn same_person(upstream_name: &str, display_name: &str) -> bool {
    upstream_name == display_name || fold_diacritics(upstream_name) == fold_diacritics(display_name)
}

/// Picks the downstream assignee for an issue.
pub(crate) struct AssigneeResolver<'a> {
    tracker: &'a dyn Tracker,
    identities: &'a dyn IdentityLookup,
}

impl<'a> AssigneeResolver<'a> {
    pub(crate) fn new(tracker: &'a dyn Tracker, identities: &'a dyn IdentityLookup) -> Self {
        Self {
            tracker,
            identities,
        }
    }

    /// Applies the assignee policy to `ticket`.
    pub(crate) async fn sync(
        &self,
        issue: &Issue,
        ticket: &mut Ticket,
        overwrite: bool,
    ) -> Result<(), TrackerError> {
        let owner = issue.downstream().owner.as_deref();
        let candidates = issue.assignee();

        let Some(current) = ticket.assignee.clone() else {
            return self.assign_resolved(candidates, owner, ticket).await;
        };
        if !overwrite {
            return Ok(());
        }

        match candidates.iter().find(|c| !c.fullname.is_empty()) {
            Some(candidate) if same_person(&candidate.fullname, &current.display_name) => {
                debug!(key = %ticket.key, assignee = %current.display_name, "Assignee already matches");
                Ok(())
            }
            Some(_) => self.assign_resolved(candidates, owner, ticket).await,
            None if candidates.is_empty() => {
                if owner == Some(current.name.as_str()) {
                    return Ok(());
                }
                self.tracker.assign(&ticket.key, None).await?;
                ticket.assignee = None;
                info!(key = %ticket.key, "Cleared assignee");
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn assign_resolved(
        &self,
        candidates: &[UpstreamUser],
        owner: Option<&str>,
        ticket: &mut Ticket,
    ) -> Result<(), TrackerError> {
        let chosen = match self.resolve(candidates).await? {
            Some(user) => user,
            None => match owner {
                Some(owner) => {
                    warn!(key = %ticket.key, owner, "Falling back to repository owner");
                    DirectoryUser {
                        name: owner.to_string(),
                        key: owner.to_string(),
                        display_name: owner.to_string(),
                        email: None,
                    }
                }
                None => {
                    debug!(key = %ticket.key, "No assignee resolved and no owner configured");
                    return Ok(());
                }
            },
        };

        if ticket
            .assignee
            .as_ref()
            .is_some_and(|current| current.name == chosen.name)
        {
            return Ok(());
        }

        self.tracker.assign(&ticket.key, Some(&chosen.name)).await?;
        info!(key = %ticket.key, assignee = %chosen.name, "Updated assignee");
        ticket.assignee = Some(chosen);
        Ok(())
    }

    /// Resolves the first candidate whose email maps to exactly one directory
    /// user (or to one user with that exact email).
    async fn resolve(
        &self,
        candidates: &[UpstreamUser],
    ) -> Result<Option<DirectoryUser>, TrackerError> {
        for candidate in candidates {
            let emails = match self.identities.emails(&candidate.login).await {
                Ok(emails) => emails,
                Err(e) => {
                    warn!(login = %candidate.login, error = %e, "Identity lookup failed");
                    continue;
                }
            };

            for email in &emails {
                let mut users = self.tracker.search_users(email).await?;
                match users.len() {
                    0 => continue,
                    1 => return Ok(users.pop()),
                    count => {
                        if let Some(user) = users
                            .into_iter()
                            .find(|u| u.email.as_deref() == Some(email.as_str()))
                        {
                            return Ok(Some(user));
                        }
                        warn!(login = %candidate.login, email = %email, count, "Ambiguous directory match");
                        break;
                    }
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RepoConfig, Source};
    use crate::identity::StaticIdentityLookup;
    use crate::intermediary::UpstreamIssue;
    use crate::tracker::memory::MemoryTracker;
    use std::collections::BTreeMap;

    fn user(name: &str, display: &str, email: &str) -> DirectoryUser {
        DirectoryUser {
            name: name.to_string(),
            key: name.to_string(),
            display_name: display.to_string(),
            email: Some(email.to_string()),
        }
    }

    fn issue(assignees: Vec<UpstreamUser>, owner: Option<&str>) -> Issue {
        Issue::with_downstream(
            Source::Github,
            "org/repo",
            UpstreamIssue {
                assignees,
                ..Default::default()
            },
            RepoConfig {
                owner: owner.map(str::to_string),
                ..Default::default()
            },
        )
    }

    fn identities() -> StaticIdentityLookup {
        StaticIdentityLookup::new(BTreeMap::from([
            ("erik".to_string(), vec!["erik@example.com".to_string()]),
            ("dup".to_string(), vec!["dup@example.com".to_string()]),
        ]))
    }

    fn setup(ticket_assignee: Option<DirectoryUser>) -> (MemoryTracker, Ticket) {
        let tracker = MemoryTracker::new();
        tracker.state().users = vec![
            user("erik", "Erik", "erik@example.com"),
            user("dup1", "Dup One", "dup@example.org"),
            user("dup2", "Dup Two", "dup@example.net"),
        ];
        let ticket = Ticket {
            key: "FACTORY-1".to_string(),
            assignee: ticket_assignee,
            ..Default::default()
        };
        tracker.insert_ticket(ticket.clone());
        (tracker, ticket)
    }

    #[test]
    fn folds_diacritics() {
        assert_eq!(fold_diacritics("Èŕìḱ"), "Erik");
        assert!(same_person("Èŕìḱ", "Erik"));
        assert!(!same_person("Erika", "Erik"));
    }

    #[tokio::test]
    async fn accent_only_difference_is_not_an_update() {
        let (tracker, mut ticket) = setup(Some(user("erik", "Erik", "erik@example.com")));
        let lookup = identities();
        let resolver = AssigneeResolver::new(&tracker, &lookup);

        resolver
            .sync(&issue(vec![UpstreamUser::new("erik", "Èŕìḱ")], None), &mut ticket, true)
            .await
            .unwrap();

        assert!(tracker.writes().is_empty());
    }

    #[tokio::test]
    async fn assigns_resolved_user_when_unassigned() {
        let (tracker, mut ticket) = setup(None);
        let lookup = identities();
        let resolver = AssigneeResolver::new(&tracker, &lookup);

        resolver
            .sync(&issue(vec![UpstreamUser::new("erik", "Erik")], Some("owner")), &mut ticket, false)
            .await
            .unwrap();

        assert_eq!(tracker.writes(), vec!["assign FACTORY-1 erik"]);
        assert_eq!(ticket.assignee.unwrap().name, "erik");
    }

    #[tokio::test]
    async fn ambiguous_match_falls_back_to_owner() {
        let (tracker, mut ticket) = setup(None);
        let lookup = identities();
        let resolver = AssigneeResolver::new(&tracker, &lookup);

        resolver
            .sync(&issue(vec![UpstreamUser::new("dup", "Dup")], Some("owner")), &mut ticket, true)
            .await
            .unwrap();

        assert_eq!(tracker.writes(), vec!["assign FACTORY-1 owner"]);
    }

    #[tokio::test]
    async fn no_owner_and_no_resolution_is_a_no_op() {
        let (tracker, mut ticket) = setup(None);
        let lookup = identities();
        let resolver = AssigneeResolver::new(&tracker, &lookup);

        resolver
            .sync(&issue(vec![UpstreamUser::new("nobody", "Nobody")], None), &mut ticket, true)
            .await
            .unwrap();

        assert!(tracker.writes().is_empty());
        assert!(ticket.assignee.is_none());
    }

    #[tokio::test]
    async fn keeps_existing_assignee_without_overwrite() {
        let (tracker, mut ticket) = setup(Some(user("someone", "Someone", "s@example.com")));
        let lookup = identities();
        let resolver = AssigneeResolver::new(&tracker, &lookup);

        resolver
            .sync(&issue(vec![UpstreamUser::new("erik", "Erik")], None), &mut ticket, false)
            .await
            .unwrap();

        assert!(tracker.writes().is_empty());
    }

    #[tokio::test]
    async fn clears_assignee_unless_owner() {
        let (tracker, mut ticket) = setup(Some(user("owner", "Owner", "o@example.com")));
        let lookup = identities();
        let resolver = AssigneeResolver::new(&tracker, &lookup);
        resolver
            .sync(&issue(Vec::new(), Some("owner")), &mut ticket, true)
            .await
            .unwrap();
        assert!(tracker.writes().is_empty());

        let (tracker, mut ticket) = setup(Some(user("erik", "Erik", "erik@example.com")));
        let resolver = AssigneeResolver::new(&tracker, &lookup);
        resolver
            .sync(&issue(Vec::new(), Some("owner")), &mut ticket, true)
            .await
            .unwrap();
        assert_eq!(tracker.writes(), vec!["assign FACTORY-1 -"]);
        assert!(ticket.assignee.is_none());
    }

    #[tokio::test]
    async fn repeated_owner_fallback_does_not_rewrite() {
        let (tracker, mut ticket) = setup(Some(user("owner", "Owner", "o@example.com")));
        let lookup = identities();
        let resolver = AssigneeResolver::new(&tracker, &lookup);

        resolver
            .sync(&issue(vec![UpstreamUser::new("nobody", "Nobody")], Some("owner")), &mut ticket, true)
            .await
            .unwrap();

        assert!(tracker.writes().is_empty());
    }
}
