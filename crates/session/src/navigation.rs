use crate::machine::{SessionPhase, SessionSnapshot};

/// Classification of the route the user is currently on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Sign-in / sign-up pages
    AuthPage,
    /// Pages that require an authenticated session
    Protected,
    /// Everything else
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirect {
    ToSignIn,
    ToHome,
}

/// Pure navigation policy.
///
/// Evaluated only when the machine is settled: while initializing or
/// signing out the answer is always "stay put", so re-running this with
/// unchanged inputs is idempotent and side-effect-free.
pub fn navigation_action(snapshot: &SessionSnapshot, route: RouteClass) -> Option<Redirect> {
    match snapshot.phase {
        SessionPhase::Uninitialized | SessionPhase::Initializing | SessionPhase::SigningOut => {
            return None
        }
        SessionPhase::Authenticated | SessionPhase::Unauthenticated => {}
    }

    match (snapshot.session.is_some(), route) {
        (false, RouteClass::Protected) => Some(Redirect::ToSignIn),
        (true, RouteClass::AuthPage) => Some(Redirect::ToHome),
        _ => None,
    }
}
