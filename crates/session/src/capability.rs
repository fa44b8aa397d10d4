use crate::machine::SessionSnapshot;
use crate::ports::Role;

/// Coarse view permissions derived from the current session snapshot.
///
/// Pure derivation, recomputed on every read. Fails closed: while the
/// machine is loading, or while no role is resolved, nothing is granted.
/// "Last known role" is never used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub is_admin: bool,
    pub is_user: bool,
}

impl Capabilities {
    pub fn from_snapshot(snapshot: &SessionSnapshot) -> Self {
        Self::derive(snapshot.loading, snapshot.session.is_some(), snapshot.role)
    }

    pub fn derive(loading: bool, has_session: bool, role: Option<Role>) -> Self {
        if loading || !has_session {
            return Self::none();
        }
        match role {
            Some(Role::Admin) => Self {
                is_admin: true,
                is_user: true,
            },
            Some(Role::User) => Self {
                is_admin: false,
                is_user: true,
            },
            None => Self::none(),
        }
    }

    fn none() -> Self {
        Self {
            is_admin: false,
            is_user: false,
        }
    }
}
