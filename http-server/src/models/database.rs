use chrono::Utc;
use hex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::User;

// Simple in-memory account storage, keyed by session id
#[derive(Clone)]
pub struct InMemoryStorage {
    pub accounts: Arc<Mutex<HashMap<String, User>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            accounts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    // Stable user id derived from the email, so the same person gets the
    // same wallet across sessions
    pub fn hash_email(email: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(email.as_bytes());
        hex::encode(hasher.finalize())
    }

    // Get or create a user account with a specific session_id
    pub fn get_or_create_account_with_session(&self, email: &str, session_id: &str) -> User {
        let mut accounts = self.accounts.lock().unwrap();

        if let Some(user) = accounts.get(session_id) {
            return user.clone();
        }

        let new_user = User {
            user_id: Self::hash_email(email),
            session_id: session_id.to_string(),
            email: email.to_string(),
            created_at: Utc::now(),
        };

        accounts.insert(session_id.to_string(), new_user.clone());
        new_user
    }

    // Get user by session ID
    pub fn get_user_by_session_id(&self, session_id: &str) -> Option<User> {
        let accounts = self.accounts.lock().unwrap();
        accounts.get(session_id).cloned()
    }
}
