use http::StatusCode;
use thiserror::Error;

#[derive(Debug)]
pub struct DBError {
    not_found: bool,
}

impl DBError {
    pub fn new() -> Self {
        DBError { not_found: false }
    }

    pub fn not_found() -> Self {
        DBError { not_found: true }
    }

    pub fn is_not_found(&self) -> bool {
        self.not_found
    }
}

impl Default for DBError {
    fn default() -> Self {
        Self::new()
    }
}

impl From<DBError> for StatusCode {
    fn from(e: DBError) -> Self {
        if e.not_found {
            StatusCode::NOT_FOUND
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[derive(Debug)]
pub struct TemplateError;
impl From<TemplateError> for StatusCode {
    fn from(_: TemplateError) -> Self {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

#[derive(Debug)]
pub struct NotAuthorized;
impl From<NotAuthorized> for StatusCode {
    fn from(_: NotAuthorized) -> Self {
        StatusCode::FORBIDDEN
    }
}

/// Failures while wiring the plugin into the host. These never abort request
/// handling; they are turned into admin notices.
#[derive(Debug, Error)]
pub enum BootError {
    #[error("invalid name '{0}'")]
    InvalidName(String),

    #[error("'{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("unknown post type '{0}'")]
    UnknownPostType(String),

    #[error("admin menu slug '{0}' is already in use")]
    MenuSlugTaken(String),

    #[error("template '{0}' is not loaded")]
    MissingTemplate(String),
}
