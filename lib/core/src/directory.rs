//! Workspace membership oracle.
//!
//! The lifecycle core does NOT own the member/role directory. It only
//! knows this trait; the concrete implementation (an auth service, a
//! static config table, ...) is injected at startup time.
//!
//! Membership is re-validated per write, never cached by callers: a
//! task may keep referencing a former member as its assignee, but a
//! NEW assignment requires current membership at the moment of the
//! write.

use std::collections::HashMap;

use crate::ServiceError;

/// Role of a member within a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Member,
}

/// Pluggable membership directory.
pub trait Directory: Send + Sync {
    /// Current role of `user_id` within `workspace_id`, or `None` if
    /// the user is not presently a member.
    fn role_of(&self, workspace_id: &str, user_id: &str) -> Result<Option<Role>, ServiceError>;

    /// Display name for a user, if the directory knows one.
    ///
    /// Activity entries record display identity at write time, so the
    /// text stays meaningful even after the member leaves. Callers
    /// fall back to the raw id when this returns `None`.
    fn display_name(&self, workspace_id: &str, user_id: &str) -> Option<String>;
}

/// A directory where every id is a member. Used for testing and for
/// single-tenant deployments without a member roster.
pub struct AllowAll;

impl Directory for AllowAll {
    fn role_of(&self, _workspace_id: &str, _user_id: &str) -> Result<Option<Role>, ServiceError> {
        Ok(Some(Role::Member))
    }

    fn display_name(&self, _workspace_id: &str, _user_id: &str) -> Option<String> {
        None
    }
}

/// A directory with no members at all. Used for testing.
pub struct EmptyDirectory;

impl Directory for EmptyDirectory {
    fn role_of(&self, _workspace_id: &str, _user_id: &str) -> Result<Option<Role>, ServiceError> {
        Ok(None)
    }

    fn display_name(&self, _workspace_id: &str, _user_id: &str) -> Option<String> {
        None
    }
}

/// An in-memory directory loaded from configuration.
#[derive(Default)]
pub struct StaticDirectory {
    // (workspace_id, user_id) -> (role, display name)
    members: HashMap<(String, String), (Role, Option<String>)>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a member. Later inserts for the same (workspace, user)
    /// pair replace earlier ones.
    pub fn insert(
        &mut self,
        workspace_id: impl Into<String>,
        user_id: impl Into<String>,
        role: Role,
        display_name: Option<String>,
    ) {
        self.members
            .insert((workspace_id.into(), user_id.into()), (role, display_name));
    }
}

impl Directory for StaticDirectory {
    fn role_of(&self, workspace_id: &str, user_id: &str) -> Result<Option<Role>, ServiceError> {
        Ok(self
            .members
            .get(&(workspace_id.to_string(), user_id.to_string()))
            .map(|(role, _)| *role))
    }

    fn display_name(&self, workspace_id: &str, user_id: &str) -> Option<String> {
        self.members
            .get(&(workspace_id.to_string(), user_id.to_string()))
            .and_then(|(_, name)| name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_directory_lookup() {
        let mut dir = StaticDirectory::new();
        dir.insert("ws1", "alice", Role::Admin, Some("Alice A.".into()));
        dir.insert("ws1", "bob", Role::Member, None);

        assert_eq!(dir.role_of("ws1", "alice").unwrap(), Some(Role::Admin));
        assert_eq!(dir.role_of("ws1", "bob").unwrap(), Some(Role::Member));
        assert_eq!(dir.role_of("ws1", "carol").unwrap(), None);
        assert_eq!(dir.role_of("ws2", "alice").unwrap(), None);

        assert_eq!(dir.display_name("ws1", "alice").as_deref(), Some("Alice A."));
        assert_eq!(dir.display_name("ws1", "bob"), None);
    }

    #[test]
    fn allow_all_admits_anyone() {
        assert_eq!(AllowAll.role_of("ws", "whoever").unwrap(), Some(Role::Member));
    }

    #[test]
    fn empty_directory_admits_no_one() {
        assert_eq!(EmptyDirectory.role_of("ws", "whoever").unwrap(), None);
    }
}
