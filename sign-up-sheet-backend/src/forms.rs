use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, Utc};
use http::Method;
use http_body_util::BodyExt as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use sign_up_sheet_database::models::{
    AssignmentId, DeadlineTypeId, TeamId, Topic, TopicAttributes, TopicId,
};

use crate::error::AppError;
use crate::session::Session;

/// The raw parameters of a request: the query string of a `GET`, the form body otherwise.
#[derive(Debug, Clone)]
pub struct Params {
    method: Method,
    raw: Bytes,
}

impl Params {
    pub async fn from_request<B>(request: http::Request<B>) -> Result<Self, AppError>
    where
        B: http_body::Body,
        B::Error: std::error::Error + Send + Sync + 'static,
    {
        let (parts, body) = request.into_parts();
        let raw = if parts.method == Method::GET || parts.method == Method::HEAD {
            Bytes::from(parts.uri.query().unwrap_or_default().to_owned())
        } else {
            let is_form = parts
                .headers
                .get(http::header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<mime::Mime>().ok())
                .map_or(true, |mime| {
                    mime.essence_str() == mime::APPLICATION_WWW_FORM_URLENCODED.essence_str()
                });
            if !is_form {
                return Err(AppError::UnsupportedMediaType);
            }
            body.collect()
                .await
                .map_err(|err| AppError::Body(Box::new(err)))?
                .to_bytes()
        };
        Ok(Self {
            method: parts.method,
            raw,
        })
    }

    #[must_use]
    pub fn new(method: Method, raw: impl Into<Bytes>) -> Self {
        Self {
            method,
            raw: raw.into(),
        }
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, AppError> {
        Ok(serde_urlencoded::from_bytes(&self.raw)?)
    }
}

pub trait CsrfToken {
    fn csrf_token(&self) -> String;
}

#[derive(Deserialize)]
struct CsrfField {
    #[serde(default)]
    csrf_token: String,
}

impl CsrfToken for CsrfField {
    fn csrf_token(&self) -> String {
        self.csrf_token.clone()
    }
}

/// Form values that passed the csrf check. Only safe methods skip the check.
#[derive(Debug)]
pub struct CsrfSafeForm<T> {
    pub value: T,
}

impl<T: DeserializeOwned> CsrfSafeForm<T> {
    pub fn from_params(params: &Params, session: &Session) -> Result<Self, AppError> {
        let not_get_or_head = !(params.method == Method::GET || params.method == Method::HEAD);
        if not_get_or_head {
            let expected_csrf_token = session.csrf_token();
            let actual_csrf_token = params.decode::<CsrfField>()?.csrf_token();
            if expected_csrf_token != actual_csrf_token {
                return Err(AppError::WrongCsrfToken);
            }
        }
        Ok(Self {
            value: params.decode()?,
        })
    }
}

/// Browsers submit empty inputs as `name=`, treat those like a missing value.
fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AssignmentParams {
    pub id: AssignmentId,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TopicParams {
    pub id: TopicId,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TeamParams {
    pub id: TeamId,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CreateTopicParams {
    /// The assignment.
    pub id: AssignmentId,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub topic_id: Option<TopicId>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ChangeTopicParams {
    /// The topic.
    pub id: TopicId,
    pub assignment_id: AssignmentId,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SignUpParams {
    /// The assignment.
    pub id: AssignmentId,
    pub topic_id: TopicId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstructorSignUpParams {
    pub username: String,
    pub topic_id: TopicId,
    pub assignment_id: AssignmentId,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct InstructorDropParams {
    pub team_id: TeamId,
    pub topic_id: TopicId,
    pub assignment_id: AssignmentId,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PriorityParams {
    /// The assignment.
    pub id: AssignmentId,
    pub topic_id: TopicId,
    /// Missing removes the bid.
    #[serde(default, deserialize_with = "empty_as_none")]
    pub priority: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopicDeadlineParams {
    pub topic_id: TopicId,
    pub deadline_type_id: DeadlineTypeId,
    pub due_at: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub round: Option<i32>,
}

/// Accepts RFC 3339 and the `YYYY-MM-DD HH:MM` format of date pickers (read as UTC).
#[must_use]
pub fn parse_due_at(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    DateTime::parse_from_rfc3339(value)
        .map(|date| date.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M")
                .ok()
                .map(|date| date.and_utc())
        })
}

pub const MAX_TOPIC_IDENTIFIER_LEN: usize = 10;

/// The topic form as submitted, every field still text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicForm {
    pub topic_identifier: String,
    pub topic_name: String,
    pub category: String,
    pub max_choosers: String,
    pub description: String,
    pub link: String,
    pub micropayment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

fn optional(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_owned())
}

fn non_negative(
    field: &'static str,
    value: &str,
    default: Option<i32>,
    errors: &mut Vec<FieldError>,
) -> i32 {
    let value = value.trim();
    if value.is_empty() {
        if let Some(default) = default {
            return default;
        }
        errors.push(FieldError::new(field, format!("{field} can't be blank")));
        return 0;
    }
    match value.parse::<i32>() {
        Ok(number) if number >= 0 => number,
        _ => {
            errors.push(FieldError::new(
                field,
                format!("{field} must be a number greater than or equal to 0"),
            ));
            0
        }
    }
}

impl TopicForm {
    /// The attributes to store, or every problem found in the form.
    pub fn validate(&self) -> Result<TopicAttributes, Vec<FieldError>> {
        let mut errors = Vec::new();
        let topic_name = self.topic_name.trim();
        if topic_name.is_empty() {
            errors.push(FieldError::new("topic_name", "topic_name can't be blank"));
        }
        let topic_identifier = self.topic_identifier.trim();
        if topic_identifier.chars().count() > MAX_TOPIC_IDENTIFIER_LEN {
            errors.push(FieldError::new(
                "topic_identifier",
                format!(
                    "topic_identifier is too long (maximum is {MAX_TOPIC_IDENTIFIER_LEN} \
                     characters)"
                ),
            ));
        }
        let max_choosers = non_negative("max_choosers", &self.max_choosers, None, &mut errors);
        let micropayment = non_negative("micropayment", &self.micropayment, Some(0), &mut errors);
        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(TopicAttributes {
            topic_identifier: topic_identifier.to_owned(),
            topic_name: topic_name.to_owned(),
            category: optional(&self.category),
            max_choosers,
            description: optional(&self.description),
            link: optional(&self.link),
            micropayment,
        })
    }
}

impl From<&Topic> for TopicForm {
    fn from(topic: &Topic) -> Self {
        Self {
            topic_identifier: topic.topic_identifier.clone(),
            topic_name: topic.topic_name.clone(),
            category: topic.category.clone().unwrap_or_default(),
            max_choosers: topic.max_choosers.to_string(),
            description: topic.description.clone().unwrap_or_default(),
            link: topic.link.clone().unwrap_or_default(),
            micropayment: topic.micropayment.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;

    fn form(name: &str, identifier: &str, max_choosers: &str) -> TopicForm {
        TopicForm {
            topic_identifier: identifier.to_owned(),
            topic_name: name.to_owned(),
            max_choosers: max_choosers.to_owned(),
            ..TopicForm::default()
        }
    }

    #[test]
    fn valid_form_becomes_attributes() {
        let attributes = TopicForm {
            category: "  ".to_owned(),
            link: "https://example.org".to_owned(),
            ..form(" Caching ", "E1", "3")
        }
        .validate()
        .unwrap();
        assert_eq!(attributes.topic_name, "Caching");
        assert_eq!(attributes.max_choosers, 3);
        assert_eq!(attributes.micropayment, 0);
        assert_eq!(attributes.category, None);
        assert_eq!(attributes.link.as_deref(), Some("https://example.org"));
    }

    #[test]
    fn every_problem_is_reported() {
        let errors = TopicForm {
            micropayment: "-1".to_owned(),
            ..form("", "ABCDEFGHIJK", "many")
        }
        .validate()
        .unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|error| error.field).collect();
        assert_eq!(
            fields,
            vec!["topic_name", "topic_identifier", "max_choosers", "micropayment"]
        );
    }

    #[test]
    fn negative_capacity_is_rejected() {
        assert!(form("Caching", "E1", "-2").validate().is_err());
        assert!(form("Caching", "E1", "").validate().is_err());
        assert!(form("Caching", "E1", "0").validate().is_ok());
    }

    #[test]
    fn due_dates_in_both_formats() {
        let expected = Utc.with_ymd_and_hms(2026, 5, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_due_at("2026-05-01 12:30"), Some(expected));
        assert_eq!(parse_due_at("2026-05-01T14:30:00+02:00"), Some(expected));
        assert_eq!(parse_due_at("next friday"), None);
    }

    #[test]
    fn empty_optional_numbers_are_missing() {
        let params: PriorityParams =
            Params::new(Method::GET, "id=1&topic_id=2&priority=").decode().unwrap();
        assert_eq!(params.priority, None);
        let params: PriorityParams =
            Params::new(Method::GET, "id=1&topic_id=2&priority=3").decode().unwrap();
        assert_eq!(params.priority, Some(3));
    }

    #[test]
    fn posts_need_the_session_csrf_token() {
        let session = Session::new(
            &http::Request::builder()
                .header(http::header::COOKIE, "__Host_csrf_token=secret")
                .body(())
                .unwrap(),
            &cookie::Key::derive_from(b"0123456789abcdef0123456789abcdef"),
        );
        let wrong = Params::new(Method::POST, "csrf_token=guess&id=1");
        assert!(matches!(
            CsrfSafeForm::<AssignmentParams>::from_params(&wrong, &session),
            Err(AppError::WrongCsrfToken)
        ));
        let right = Params::new(Method::POST, "csrf_token=secret&id=1");
        let form = CsrfSafeForm::<AssignmentParams>::from_params(&right, &session).unwrap();
        assert_eq!(form.value.id, 1);
        let get = Params::new(Method::GET, "id=1");
        assert!(CsrfSafeForm::<AssignmentParams>::from_params(&get, &session).is_ok());
    }
}
