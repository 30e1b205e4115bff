//! Global user-to-team ownership registry.

use dashmap::DashMap;

/// Single source of truth for cross-team exclusivity.
///
/// Maps lowercased username to the (lowercased) name of the team currently
/// claiming exclusive membership. Claims go through an atomic vacant-entry
/// insert so two teams racing for the same user resolve to exactly one
/// winner; releases are conditional on the releasing team still being the
/// owner.
#[derive(Debug, Default)]
pub struct UserRegistry {
    owners: DashMap<String, String>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The team currently owning `user`, if any.
    pub fn team_of(&self, user: &str) -> Option<String> {
        self.owners.get(user).map(|entry| entry.value().clone())
    }

    /// Claim `user` for `team` if unowned, or confirm an existing claim by
    /// the same team. Returns `false` when another team owns the user.
    pub fn claim(&self, user: &str, team: &str) -> bool {
        let entry = self
            .owners
            .entry(user.to_string())
            .or_insert_with(|| team.to_string());
        entry.value() == team
    }

    /// Release `user`, but only if `team` is the current owner.
    pub fn release(&self, user: &str, team: &str) {
        self.owners.remove_if(user, |_, owner| owner == team);
    }

    /// Unconditional removal, for operator-driven resets.
    pub fn discard(&self, user: &str) {
        self.owners.remove(user);
    }

    pub fn is_known(&self, user: &str) -> bool {
        self.owners.contains_key(user)
    }

    pub fn clear(&self) {
        self.owners.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_first_wins() {
        let registry = UserRegistry::new();
        assert!(registry.claim("user", "red"));
        assert!(!registry.claim("user", "blue"));
        assert_eq!(registry.team_of("user").as_deref(), Some("red"));
    }

    #[test]
    fn test_claim_is_idempotent_for_owner() {
        let registry = UserRegistry::new();
        assert!(registry.claim("user", "red"));
        assert!(registry.claim("user", "red"));
    }

    #[test]
    fn test_release_only_by_owner() {
        let registry = UserRegistry::new();
        registry.claim("user", "red");
        registry.release("user", "blue");
        assert_eq!(registry.team_of("user").as_deref(), Some("red"));
        registry.release("user", "red");
        assert!(registry.team_of("user").is_none());
    }
}
