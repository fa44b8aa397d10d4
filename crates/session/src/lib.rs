pub mod bus;
pub mod cache;
pub mod capability;
pub mod client;
pub mod error;
pub mod machine;
pub mod navigation;
pub mod ports;

pub use bus::{AuthErrorBus, ErrorSubscription};
pub use cache::SessionCache;
pub use capability::Capabilities;
pub use client::{ApiClient, ClientError, RetryPolicy};
pub use error::{AuthError, AuthErrorKind};
pub use machine::{GatewayEvent, SessionManager, SessionPhase, SessionSnapshot};
pub use navigation::{navigation_action, Redirect, RouteClass};
pub use ports::{
    AuthChange, Clock, Identity, IdentityGateway, ProfileStore, Role, Session, SystemClock, UserId,
};

#[cfg(test)]
mod test_utils;
