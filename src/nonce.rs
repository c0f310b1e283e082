//! Anti-forgery tokens for state-changing admin requests.
//!
//! A token is bound to an action name, the acting user and their session, and
//! to a time tick half a lifetime long. Tokens minted in the current or the
//! previous tick verify, so a token stays valid for between half and the full
//! lifetime.

use chrono::Utc;

use crate::auth::CurrentUser;

const TOKEN_LEN: usize = 10;

#[derive(Clone)]
pub struct NonceIssuer {
    key: [u8; 32],
    lifetime: i64,
}

impl std::fmt::Debug for NonceIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NonceIssuer")
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

impl NonceIssuer {
    pub fn new(secret: &str) -> Self {
        Self {
            key: blake3::derive_key("books_rs 2024 anti-forgery token", secret.as_bytes()),
            lifetime: crate::NONCE_LIFETIME_SECS,
        }
    }

    fn tick(&self, timestamp: i64) -> i64 {
        let half = self.lifetime / 2;
        // ceil(timestamp / half)
        (timestamp + half - 1).div_euclid(half)
    }

    fn token(&self, tick: i64, action: &str, user: &CurrentUser) -> String {
        let input = format!("{}|{}|{}|{}", tick, action, user.id, user.session_token);
        let hash = blake3::keyed_hash(&self.key, input.as_bytes());
        hash.to_hex()[..TOKEN_LEN].to_string()
    }

    pub fn create_at(&self, action: &str, user: &CurrentUser, timestamp: i64) -> String {
        self.token(self.tick(timestamp), action, user)
    }

    pub fn create(&self, action: &str, user: &CurrentUser) -> String {
        self.create_at(action, user, Utc::now().timestamp())
    }

    pub fn verify_at(&self, nonce: &str, action: &str, user: &CurrentUser, timestamp: i64) -> bool {
        if nonce.len() != TOKEN_LEN {
            return false;
        }
        let tick = self.tick(timestamp);
        [tick, tick - 1]
            .iter()
            .any(|t| constant_time_eq(self.token(*t, action, user).as_bytes(), nonce.as_bytes()))
    }

    pub fn verify(&self, nonce: &str, action: &str, user: &CurrentUser) -> bool {
        self.verify_at(nonce, action, user, Utc::now().timestamp())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod test {
    use super::NonceIssuer;
    use crate::auth::{CurrentUser, Role};

    const NOW: i64 = 1_700_000_000;
    const HOUR: i64 = 3600;

    fn user(id: i32, session: &str) -> CurrentUser {
        CurrentUser {
            id,
            login: format!("user{}", id),
            role: Role::Administrator,
            session_token: session.into(),
        }
    }

    #[test]
    fn it_verifies_a_fresh_token() {
        let issuer = NonceIssuer::new("secret");
        let u = user(1, "s1");
        let nonce = issuer.create_at("delete_book_5", &u, NOW);
        assert_eq!(nonce.len(), 10);
        assert!(issuer.verify_at(&nonce, "delete_book_5", &u, NOW));
    }

    #[test]
    fn it_binds_token_to_action_user_and_session() {
        let issuer = NonceIssuer::new("secret");
        let u = user(1, "s1");
        let nonce = issuer.create_at("delete_book_5", &u, NOW);

        assert!(!issuer.verify_at(&nonce, "delete_book_6", &u, NOW));
        assert!(!issuer.verify_at(&nonce, "delete_book_5", &user(2, "s1"), NOW));
        assert!(!issuer.verify_at(&nonce, "delete_book_5", &user(1, "s2"), NOW));
        assert!(!NonceIssuer::new("other").verify_at(&nonce, "delete_book_5", &u, NOW));
    }

    #[test]
    fn it_expires_after_the_lifetime() {
        let issuer = NonceIssuer::new("secret");
        let u = user(1, "s1");
        let nonce = issuer.create_at("bulk-books", &u, NOW);

        assert!(issuer.verify_at(&nonce, "bulk-books", &u, NOW + 11 * HOUR));
        assert!(!issuer.verify_at(&nonce, "bulk-books", &u, NOW + 25 * HOUR));
    }

    #[test]
    fn it_rejects_malformed_tokens() {
        let issuer = NonceIssuer::new("secret");
        let u = user(1, "s1");
        assert!(!issuer.verify_at("", "bulk-books", &u, NOW));
        assert!(!issuer.verify_at("not-a-nonce-at-all", "bulk-books", &u, NOW));
    }
}
