use std::convert::Infallible;

use bytes::Bytes;
use http::{Response, StatusCode};
use http_body_util::Full;
use serde::Serialize;
use sign_up_sheet_config::ConfigError;
use sign_up_sheet_database::error::DatabaseError;
use tracing::{error, warn};

use crate::context::Actor;
use crate::session::{ResponseSessionExt, Session};
use crate::ResponseTypedHeaderExt;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    File(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("http error: {0}")]
    Http(#[from] http::Error),
    #[error("failed to read request body: {0}")]
    Body(Box<dyn std::error::Error + Send + Sync>),
    #[error("invalid form data: {0}")]
    Form(#[from] serde_urlencoded::de::Error),
    #[error("failed to encode cookie: {0}")]
    Cookie(#[from] serde_urlencoded::ser::Error),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to set up logging: {0}")]
    Telemetry(#[from] tracing_subscriber::util::TryInitError),
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("form data must be sent as application/x-www-form-urlencoded")]
    UnsupportedMediaType,
    #[error("wrong csrf token")]
    WrongCsrfToken,
    #[error("you need to be logged in")]
    Unauthenticated,
    #[error("you are not allowed to do this")]
    Forbidden,
    #[error("{entity} {id} does not exist")]
    NotFound { entity: &'static str, id: i32 },
    #[error("no route for {method} {path}")]
    NoRoute { method: http::Method, path: String },
    #[error("{method} is not allowed for {path}")]
    MethodNotAllowed { method: http::Method, path: String },
}

impl From<Infallible> for AppError {
    fn from(value: Infallible) -> Self {
        match value {}
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl AppError {
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Form(_) | Self::WrongCsrfToken => StatusCode::BAD_REQUEST,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound { .. } | Self::NoRoute { .. } => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn build_error_response(self, session: Session) -> Response<Full<Bytes>> {
        let status = self.status_code();
        if status.is_server_error() {
            error!("request failed: {self}");
        } else {
            warn!("request refused: {self}");
        }
        // internals stay in the log
        let message = if status.is_server_error() {
            "Internal Server Error".to_owned()
        } else {
            self.to_string()
        };
        let response = serde_json::to_vec(&ErrorBody { error: message })
            .map_err(Self::from)
            .and_then(|body| {
                Ok(Response::builder()
                    .status(status)
                    .with_session(session)
                    .typed_header(headers::ContentType::json())
                    .body(Full::new(Bytes::from(body)))?)
            });
        response.unwrap_or_else(|err| {
            error!("failed to build error response: {err}");
            let mut fallback = Response::new(Full::new(Bytes::from_static(b"Internal Server Error")));
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
    }
}

/// Reasons an action refuses a state transition. They are shown to the user as an
/// error flash and never turn into a failed response.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SignUpSheetError {
    #[error("{entity} {id} does not exist")]
    NotFound { entity: &'static str, id: i32 },
    #[error("{0}")]
    ValidationFailure(String),
    #[error("the team already holds a topic")]
    AlreadySignedUp,
    #[error("the drop topic deadline has passed")]
    DeadlinePassed,
    #[error("the team has already submitted work")]
    HasSubmission,
    #[error("user {0} does not exist")]
    UserNotFound(String),
    #[error("the user is not a participant of the assignment")]
    NotParticipant,
    #[error("the team is not signed up for the topic")]
    NotSignedUp,
    #[error("the topic is not a suggestion of the team")]
    NotSuggestedTopic,
}

impl SignUpSheetError {
    /// The flash message, worded for whoever triggered the action.
    #[must_use]
    pub fn message(&self, actor: Actor) -> String {
        match (self, actor) {
            (Self::NotFound { entity, .. }, _) => format!("The {entity} could not be found."),
            (Self::ValidationFailure(message), _) => message.clone(),
            (Self::AlreadySignedUp, Actor::Student) => {
                "You've already signed up for a topic!".to_owned()
            }
            (Self::AlreadySignedUp, Actor::Instructor) => {
                "The student has already signed up for a topic!".to_owned()
            }
            (Self::DeadlinePassed, Actor::Student) => {
                "You cannot drop your topic after the drop topic deadline!".to_owned()
            }
            (Self::DeadlinePassed, Actor::Instructor) => {
                "You cannot drop a student after the drop topic deadline!".to_owned()
            }
            (Self::HasSubmission, Actor::Student) => {
                "You have already submitted your work, so you are not allowed to drop your topic."
                    .to_owned()
            }
            (Self::HasSubmission, Actor::Instructor) => {
                "The student has already submitted their work, so you are not allowed to remove \
                 them."
                    .to_owned()
            }
            (Self::UserNotFound(_), _) => "That student does not exist!".to_owned(),
            (Self::NotParticipant, Actor::Student) => {
                "You are not registered for this assignment!".to_owned()
            }
            (Self::NotParticipant, Actor::Instructor) => {
                "The student is not registered for the assignment!".to_owned()
            }
            (Self::NotSignedUp, Actor::Student) => "You are not signed up for this topic!".to_owned(),
            (Self::NotSignedUp, Actor::Instructor) => {
                "The team is not signed up for this topic!".to_owned()
            }
            (Self::NotSuggestedTopic, _) => {
                "The topic is not an approved suggestion for your team!".to_owned()
            }
        }
    }
}
