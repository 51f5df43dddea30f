use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

pub trait SessionStore: Send + Sync {
    /// Creates a new token for `username`.
    fn issue(&self, username: &str) -> String;
    fn resolve(&self, token: &str) -> Option<String>;
    fn revoke(&self, token: &str);
}

/// Process-local sessions; all tokens are lost on restart.
#[derive(Default)]
pub struct InMemorySessionStore {
    tokens: RwLock<HashMap<String, String>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn new_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

impl SessionStore for InMemorySessionStore {
    fn issue(&self, username: &str) -> String {
        let token = new_token();
        let mut tokens = self.tokens.write().unwrap_or_else(|e| e.into_inner());
        tokens.insert(token.clone(), username.to_string());
        debug!("Issued session for {}", username);
        token
    }

    fn resolve(&self, token: &str) -> Option<String> {
        let tokens = self.tokens.read().unwrap_or_else(|e| e.into_inner());
        tokens.get(token).cloned()
    }

    fn revoke(&self, token: &str) {
        let mut tokens = self.tokens.write().unwrap_or_else(|e| e.into_inner());
        tokens.remove(token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_tokens_resolve_until_revoked() {
        let store = InMemorySessionStore::new();
        let token = store.issue("ada");

        assert_eq!(token.len(), 43);
        assert_eq!(store.resolve(&token).as_deref(), Some("ada"));
        assert_eq!(store.resolve("not-a-token"), None);

        store.revoke(&token);
        assert_eq!(store.resolve(&token), None);
    }

    #[test]
    fn tokens_are_unique() {
        let store = InMemorySessionStore::new();
        assert_ne!(store.issue("ada"), store.issue("ada"));
    }
}
