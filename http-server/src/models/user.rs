use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Stable user identifier; also the wallet key in the ledger
    pub user_id: String,
    pub session_id: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// The slice of a User exposed to authenticated API responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub email: String,
}

impl From<User> for AuthenticatedUser {
    fn from(user: User) -> Self {
        AuthenticatedUser {
            user_id: user.user_id,
            email: user.email,
        }
    }
}
