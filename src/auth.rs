use http::header::COOKIE;
use http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::config::UserConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Administrator,
    Editor,
    Author,
    Subscriber,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
    ManageOptions,
    EditPosts,
    EditOthersPosts,
    DeletePosts,
}

impl Role {
    pub fn capabilities(&self) -> &'static [Capability] {
        use Capability::*;
        match self {
            Role::Administrator => &[ManageOptions, EditPosts, EditOthersPosts, DeletePosts],
            Role::Editor => &[EditPosts, EditOthersPosts, DeletePosts],
            Role::Author => &[EditPosts],
            Role::Subscriber => &[],
        }
    }
}

/// The user an admin request acts as, together with the session the request
/// was authenticated by. Anti-forgery tokens are bound to both.
#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub id: i32,
    pub login: String,
    pub role: Role,
    pub session_token: String,
}

impl CurrentUser {
    pub fn from_config(user: &UserConfig) -> Self {
        Self {
            id: user.id,
            login: user.login.clone(),
            role: user.role,
            session_token: user.session_token.clone(),
        }
    }

    pub fn can(&self, cap: Capability) -> bool {
        self.role.capabilities().contains(&cap)
    }

    /// Whether this user may edit a post written by `post_author`.
    pub fn can_edit_post(&self, post_author: i32) -> bool {
        self.can(Capability::EditOthersPosts)
            || (self.can(Capability::EditPosts) && post_author == self.id)
    }
}

fn session_from_cookies(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == crate::SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

pub fn current_user(headers: &HeaderMap, users: &[UserConfig]) -> Option<CurrentUser> {
    let token = session_from_cookies(headers)?;
    if token.is_empty() {
        return None;
    }
    users
        .iter()
        .find(|u| u.session_token == token)
        .map(CurrentUser::from_config)
}

#[cfg(test)]
mod test {
    use http::header::{HeaderValue, COOKIE};
    use http::HeaderMap;

    use super::{current_user, Capability, CurrentUser, Role};
    use crate::config::UserConfig;

    fn users() -> Vec<UserConfig> {
        vec![
            UserConfig { id: 1, login: "admin".into(), role: Role::Administrator, session_token: "tok-admin".into() },
            UserConfig { id: 2, login: "writer".into(), role: Role::Author, session_token: "tok-writer".into() },
        ]
    }

    #[test]
    fn it_finds_user_by_session_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; books_session=tok-writer"));

        let user = current_user(&headers, &users()).unwrap();
        assert_eq!(user.login, "writer");
    }

    #[test]
    fn it_rejects_unknown_or_missing_sessions() {
        let mut headers = HeaderMap::new();
        assert!(current_user(&headers, &users()).is_none());

        headers.insert(COOKIE, HeaderValue::from_static("books_session=nope"));
        assert!(current_user(&headers, &users()).is_none());

        headers.insert(COOKIE, HeaderValue::from_static("books_session="));
        assert!(current_user(&headers, &users()).is_none());
    }

    #[test]
    fn authors_only_edit_their_own_posts() {
        let author = CurrentUser::from_config(&users()[1]);
        assert!(author.can_edit_post(2));
        assert!(!author.can_edit_post(1));
        assert!(!author.can(Capability::ManageOptions));

        let admin = CurrentUser::from_config(&users()[0]);
        assert!(admin.can_edit_post(2));
        assert!(admin.can(Capability::ManageOptions));
    }

    #[test]
    fn subscribers_edit_nothing() {
        let sub = CurrentUser {
            id: 9,
            login: "sub".into(),
            role: Role::Subscriber,
            session_token: "s".into(),
        };
        assert!(!sub.can_edit_post(9));
    }
}
