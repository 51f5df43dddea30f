use super::AuthError;
use crate::db::warehouse::Warehouse;
use duckdb::{params, OptionalExt};
use sha2::{Digest, Sha256};
use tracing::info;

/// Username and password-hash table kept in the warehouse database.
pub struct UserStore {
    warehouse: Warehouse,
}

fn hash_password(password: &str) -> String {
    format!("{:x}", Sha256::digest(password.as_bytes()))
}

impl UserStore {
    /// Opens the store, creating `user_credentials` if needed.
    pub async fn open(warehouse: Warehouse) -> Result<Self, AuthError> {
        warehouse
            .with_connection(|conn| {
                conn.execute_batch(
                    "CREATE TABLE IF NOT EXISTS user_credentials (
                        username TEXT PRIMARY KEY,
                        password_hash TEXT
                    )",
                )?;
                Ok(())
            })
            .await?;
        Ok(Self { warehouse })
    }

    pub async fn create_user(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let username = username.to_string();
        let hashed = hash_password(password);

        let created = self
            .warehouse
            .with_connection(move |conn| {
                let exists = conn
                    .query_row(
                        "SELECT 1 FROM user_credentials WHERE username = ?",
                        params![username],
                        |_| Ok(()),
                    )
                    .optional()?
                    .is_some();
                if exists {
                    return Ok(false);
                }
                conn.execute(
                    "INSERT INTO user_credentials (username, password_hash) VALUES (?, ?)",
                    params![username, hashed],
                )?;
                Ok(true)
            })
            .await?;

        if !created {
            return Err(AuthError::UserExists);
        }
        info!("Registered user");
        Ok(())
    }

    pub async fn verify_user(&self, username: &str, password: &str) -> Result<bool, AuthError> {
        let username = username.to_string();
        let hashed = hash_password(password);

        let stored: Option<Option<String>> = self
            .warehouse
            .with_connection(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT password_hash FROM user_credentials WHERE username = ?",
                        params![username],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await?;

        Ok(stored.flatten().is_some_and(|h| h == hashed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::warehouse::tests::seeded_warehouse;

    #[test]
    fn password_hash_is_hex_sha256() {
        assert_eq!(
            hash_password("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn register_then_verify() {
        let (_dir, warehouse) = seeded_warehouse().await;
        let users = UserStore::open(warehouse).await.unwrap();

        users.create_user("ada", "s3cret").await.unwrap();
        assert!(users.verify_user("ada", "s3cret").await.unwrap());
        assert!(!users.verify_user("ada", "wrong").await.unwrap());
        assert!(!users.verify_user("bob", "s3cret").await.unwrap());

        assert!(matches!(
            users.create_user("ada", "other").await,
            Err(AuthError::UserExists)
        ));
    }
}
