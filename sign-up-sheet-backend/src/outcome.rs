use bytes::Bytes;
use http::header::LOCATION;
use http::{Response, StatusCode};
use http_body_util::Full;
use serde::Serialize;
use sign_up_sheet_database::models::AssignmentId;

use crate::error::AppError;
use crate::flash::Flash;
use crate::session::{ResponseSessionExt, Session};
use crate::ResponseTypedHeaderExt;

#[must_use]
pub fn assignment_edit_path(assignment_id: AssignmentId) -> String {
    format!("/assignments/{assignment_id}/edit")
}

#[must_use]
pub fn list_path(assignment_id: AssignmentId) -> String {
    format!("/sign_up_sheet/list?id={assignment_id}")
}

#[must_use]
pub fn staggered_path(assignment_id: AssignmentId) -> String {
    format!("/sign_up_sheet/add_signup_topics_staggered?id={assignment_id}")
}

/// What an action decided to show: a view with its data, or a redirect. Both may
/// carry a flash message.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum Outcome {
    Render {
        view: &'static str,
        data: serde_json::Value,
        flash: Option<Flash>,
    },
    Redirect {
        location: String,
        flash: Option<Flash>,
    },
}

#[derive(Serialize)]
struct Page<'a> {
    view: &'static str,
    flash: Option<&'a Flash>,
    data: &'a serde_json::Value,
}

impl Outcome {
    pub fn render(view: &'static str, data: &impl Serialize) -> Result<Self, AppError> {
        Ok(Self::Render {
            view,
            data: serde_json::to_value(data)?,
            flash: None,
        })
    }

    pub fn redirect(location: impl Into<String>) -> Self {
        Self::Redirect {
            location: location.into(),
            flash: None,
        }
    }

    pub fn with_flash(self, new_flash: Flash) -> Self {
        match self {
            Self::Render { view, data, .. } => Self::Render {
                view,
                data,
                flash: Some(new_flash),
            },
            Self::Redirect { location, .. } => Self::Redirect {
                location,
                flash: Some(new_flash),
            },
        }
    }

    #[must_use]
    pub const fn view(&self) -> Option<&'static str> {
        match self {
            Self::Render { view, .. } => Some(*view),
            Self::Redirect { .. } => None,
        }
    }

    #[must_use]
    pub fn location(&self) -> Option<&str> {
        match self {
            Self::Render { .. } => None,
            Self::Redirect { location, .. } => Some(location.as_str()),
        }
    }

    #[must_use]
    pub const fn flash(&self) -> Option<&Flash> {
        match self {
            Self::Render { flash, .. } | Self::Redirect { flash, .. } => flash.as_ref(),
        }
    }

    #[must_use]
    pub const fn data(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Render { data, .. } => Some(data),
            Self::Redirect { .. } => None,
        }
    }

    /// Renders show their flash right away (together with one left over from a
    /// previous redirect), redirects hand it to the next request in a cookie.
    pub fn into_response(self, mut session: Session) -> Result<Response<Full<Bytes>>, AppError> {
        match self {
            Self::Render { view, data, flash } => {
                let pending = session.take_flash();
                let body = serde_json::to_vec(&Page {
                    view,
                    flash: flash.as_ref().or(pending.as_ref()),
                    data: &data,
                })?;
                Ok(Response::builder()
                    .status(StatusCode::OK)
                    .with_session(session)
                    .typed_header(headers::ContentType::json())
                    .body(Full::new(Bytes::from(body)))?)
            }
            Self::Redirect { location, flash } => {
                session.set_flash(flash);
                Ok(Response::builder()
                    .status(StatusCode::SEE_OTHER)
                    .header(LOCATION, location)
                    .with_session(session)
                    .body(Full::new(Bytes::new()))?)
            }
        }
    }
}
