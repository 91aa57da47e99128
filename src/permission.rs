//! The permission seam.
//!
//! The policy that decides which users may read which paths is an external
//! collaborator (access control lists, LDAP group lookups, whatever the
//! deployment wants); this crate only defines the seam it plugs into and
//! ships a permissive default for standalone use and tests.

use std::path::Path;

/// The action a permission check is being made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Reading a file's content (cat/grep/tail/map source).
    Read,
    /// Listing a directory as part of glob expansion.
    List,
}

/// Decides whether a user may perform `action` on `path`.
///
/// Implementations must be safe to call concurrently from every session's
/// dispatcher thread; they should not block for long, since a slow oracle
/// stalls file admission for the whole server.
pub trait PermissionOracle: Send + Sync {
    /// Return `true` if `user` may perform `action` on `path`.
    fn can(&self, user: &str, path: &Path, action: Action) -> bool;
}

/// A permission oracle that allows everything. The default when no
/// deployment-specific oracle is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl PermissionOracle for AllowAll {
    fn can(&self, _user: &str, _path: &Path, _action: Action) -> bool {
        true
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn allow_all_allows_everything() {
        let oracle = AllowAll;
        assert!(oracle.can("alice", Path::new("/var/log/syslog"), Action::Read));
        assert!(oracle.can("alice", Path::new("/var/log"), Action::List));
    }
}
