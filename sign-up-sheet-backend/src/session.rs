use cookie::{Cookie, CookieJar, Key, SameSite};
use http::header::{COOKIE, SET_COOKIE};
use http::Request;
use rand::{thread_rng, Rng as _};
use sign_up_sheet_database::models::UserId;
use tracing::{debug, error};

use crate::flash::Flash;

const COOKIE_NAME_CSRF_TOKEN: &str = "__Host_csrf_token";
const COOKIE_NAME_USER: &str = "__Host_user";
const COOKIE_NAME_FLASH: &str = "__Host_flash";

/// The cookie state of one request. Every field carries whether the response has to
/// write it back.
#[derive(Clone, Debug)]
#[must_use]
pub struct Session {
    csrf_token: (String, bool),
    /// Verified against the signing key, set by the login layer in front of this service.
    user_id: Option<UserId>,
    flash: (Option<Flash>, bool),
}

impl Session {
    pub fn new<T>(request: &Request<T>, key: &Key) -> Self {
        let mut jar = CookieJar::new();
        request
            .headers()
            .get_all(COOKIE)
            .into_iter()
            .filter_map(|value| value.to_str().ok())
            .map(std::borrow::ToOwned::to_owned)
            .flat_map(Cookie::split_parse)
            .filter_map(std::result::Result::ok)
            .for_each(|cookie| jar.add_original(cookie));

        let csrf_token = jar.get(COOKIE_NAME_CSRF_TOKEN).map_or_else(
            || {
                (
                    thread_rng()
                        .sample_iter(&rand::distributions::Alphanumeric)
                        .take(30)
                        .map(char::from)
                        .collect(),
                    true,
                )
            },
            |cookie| (cookie.value().to_owned(), false),
        );
        let user_id = jar.signed(key).get(COOKIE_NAME_USER).and_then(|cookie| {
            let parsed = cookie.value().parse().ok();
            if parsed.is_none() {
                debug!("ignoring malformed user cookie");
            }
            parsed
        });
        let flash = jar
            .get(COOKIE_NAME_FLASH)
            .and_then(|cookie| Flash::from_cookie_value(cookie.value()));
        Self {
            csrf_token,
            user_id,
            flash: (flash, false),
        }
    }

    pub fn csrf_token(&self) -> String {
        self.csrf_token.0.clone()
    }

    #[must_use]
    pub const fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    /// Consumes the flash left by the previous response.
    pub fn take_flash(&mut self) -> Option<Flash> {
        let flash = self.flash.0.take();
        if flash.is_some() {
            self.flash.1 = true;
        }
        flash
    }

    pub fn set_flash(&mut self, flash: Option<Flash>) {
        if flash.is_none() && self.flash.0.is_none() {
            return;
        }
        self.flash = (flash, true);
    }
}

/// The signed cookie that identifies the user, as issued by the login layer.
#[must_use]
pub fn user_cookie(key: &Key, user_id: UserId) -> Cookie<'static> {
    let mut jar = CookieJar::new();
    jar.signed_mut(key).add(
        Cookie::build((COOKIE_NAME_USER, user_id.to_string()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax),
    );
    jar.get(COOKIE_NAME_USER)
        .cloned()
        .unwrap_or_else(|| Cookie::new(COOKIE_NAME_USER, ""))
}

pub trait ResponseSessionExt {
    #[must_use]
    fn with_session(self, session: Session) -> Self;
}

impl ResponseSessionExt for http::response::Builder {
    fn with_session(self, session: Session) -> Self {
        let mut this = self;
        if let (value, true) = session.csrf_token {
            let cookie = Cookie::build((COOKIE_NAME_CSRF_TOKEN, value))
                .path("/")
                .same_site(SameSite::Strict)
                .build();
            this = this.header(SET_COOKIE, cookie.to_string());
        }
        if let (value, true) = session.flash {
            let cookie = match value.as_ref().map(Flash::to_cookie_value).transpose() {
                Ok(Some(value)) => Cookie::build((COOKIE_NAME_FLASH, value))
                    .path("/")
                    .http_only(true)
                    .same_site(SameSite::Lax)
                    .build(),
                Ok(None) => Cookie::build(COOKIE_NAME_FLASH).path("/").removal().build(),
                Err(err) => {
                    error!("dropping flash message: {err}");
                    Cookie::build(COOKIE_NAME_FLASH).path("/").removal().build()
                }
            };
            this = this.header(SET_COOKIE, cookie.to_string());
        }
        this
    }
}
