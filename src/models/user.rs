use chrono::{DateTime, Utc};
use serde::Serialize;

/// A registered user as resolved by the [`UserLookup`](crate::lookup::UserLookup)
/// collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    pub activated: bool,
    #[serde(skip)]
    pub version: i32,
}

/// The identity attached to a single request by the authentication stage.
///
/// Exactly one principal is inserted into the request extensions per request
/// and it is never replaced afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Anonymous,
    Authenticated(User),
}

impl Principal {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Principal::Anonymous)
    }

    /// The authenticated user, if any.
    pub fn user(&self) -> Option<&User> {
        match self {
            Principal::Anonymous => None,
            Principal::Authenticated(user) => Some(user),
        }
    }
}

/// Extension trait to read the principal from request extensions.
pub trait PrincipalExt {
    /// Get the principal attached by the authentication stage.
    ///
    /// Returns `None` if the authentication stage did not run for this request.
    fn principal(&self) -> Option<&Principal>;
}

impl<B> PrincipalExt for axum::http::Request<B> {
    fn principal(&self) -> Option<&Principal> {
        self.extensions().get::<Principal>()
    }
}
