use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use thiserror::Error;

use crate::auth::Role;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("nonce_secret must not be empty")]
    MissingNonceSecret,

    #[error("duplicate user id {0} in [[users]]")]
    DuplicateUser(i32),

    #[error("import user '{0}' is not listed in [[users]]")]
    UnknownImportUser(String),
}

#[derive(Debug, Deserialize)]
pub struct BooksSiteConfig {
    pub database_url: String,
    pub template_dir: Option<String>,

    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    pub nonce_secret: String,

    #[serde(default)]
    pub admin: AdminConfig,

    #[serde(default)]
    pub schema: SchemaConfig,

    #[serde(default)]
    pub users: Vec<UserConfig>,

    /// Login of the user `import_books` creates posts as.
    pub import_user: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdminConfig {
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self { per_page: default_per_page() }
    }
}

#[derive(Debug, Deserialize)]
pub struct SchemaConfig {
    #[serde(default = "default_collation")]
    pub collation: String,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self { collation: default_collation() }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct UserConfig {
    pub id: i32,
    pub login: String,
    pub role: Role,
    pub session_token: String,
}

impl BooksSiteConfig {
    pub fn from_toml(s: &str) -> Result<Self, anyhow::Error> {
        let config: BooksSiteConfig = toml::from_str(s).context("invalid site config")?;
        config.validate()?;
        Ok(config)
    }

    /// Reads the config file, letting `DATABASE_URL` override `database_url`.
    pub fn load(path: &Path) -> Result<Self, anyhow::Error> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("error reading config file {:?}", path))?;
        let mut config = Self::from_toml(&raw)?;
        if let Ok(url) = std::env::var(crate::DATABASE_URL_VAR) {
            config.database_url = url;
        }
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.nonce_secret.is_empty() {
            return Err(ConfigError::MissingNonceSecret);
        }

        let mut seen = std::collections::HashSet::new();
        for user in &self.users {
            if !seen.insert(user.id) {
                return Err(ConfigError::DuplicateUser(user.id));
            }
        }

        if let Some(login) = &self.import_user {
            if !self.users.iter().any(|u| &u.login == login) {
                return Err(ConfigError::UnknownImportUser(login.clone()));
            }
        }

        Ok(())
    }
}

fn default_listen_addr() -> String {
    crate::DEFAULT_LISTEN_ADDR.into()
}

fn default_per_page() -> u32 {
    crate::DEFAULT_PER_PAGE
}

fn default_collation() -> String {
    crate::DEFAULT_COLLATION.into()
}

#[cfg(test)]
mod test {
    use super::BooksSiteConfig;
    use crate::auth::Role;

    #[test]
    fn it_applies_defaults() {
        let config = BooksSiteConfig::from_toml(
            r#"
            database_url = "books.db"
            nonce_secret = "s3cret"
            "#,
        )
        .unwrap();

        assert_eq!(config.listen_addr, "127.0.0.1:3030");
        assert_eq!(config.admin.per_page, 20);
        assert_eq!(config.schema.collation, "BINARY");
        assert!(config.users.is_empty());
        assert!(config.template_dir.is_none());
    }

    #[test]
    fn it_parses_users() {
        let config = BooksSiteConfig::from_toml(
            r#"
            database_url = "books.db"
            nonce_secret = "s3cret"
            import_user = "admin"

            [[users]]
            id = 1
            login = "admin"
            role = "administrator"
            session_token = "abc"

            [[users]]
            id = 2
            login = "writer"
            role = "author"
            session_token = "def"
            "#,
        )
        .unwrap();

        assert_eq!(config.users.len(), 2);
        assert_eq!(config.users[1].role, Role::Author);
    }

    #[test]
    fn it_rejects_empty_nonce_secret() {
        let result = BooksSiteConfig::from_toml(
            r#"
            database_url = "books.db"
            nonce_secret = ""
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn it_rejects_duplicate_user_ids() {
        let result = BooksSiteConfig::from_toml(
            r#"
            database_url = "books.db"
            nonce_secret = "x"

            [[users]]
            id = 1
            login = "a"
            role = "editor"
            session_token = "a"

            [[users]]
            id = 1
            login = "b"
            role = "editor"
            session_token = "b"
            "#,
        );
        assert!(result.is_err());
    }
}
