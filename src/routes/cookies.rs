/// Refresh and session cookies
///
/// Both cookies share the same attributes: HTTP-only, SameSite=None, path
/// `/`, and a max-age equal to the effective refresh lifetime.

use actix_web::cookie::{time, Cookie, SameSite};
use actix_web::{HttpRequest, HttpResponseBuilder};

use crate::auth::IssuedSession;
use crate::configuration::CookieSettings;

pub const REFRESH_COOKIE: &str = "refTkn";
pub const SESSION_COOKIE: &str = "sid";

fn build(name: &'static str, value: String, max_age: chrono::Duration, settings: &CookieSettings) -> Cookie<'static> {
    Cookie::build(name, value)
        .http_only(true)
        .secure(settings.secure)
        .same_site(SameSite::None)
        .path("/")
        .max_age(time::Duration::seconds(max_age.num_seconds()))
        .finish()
}

pub fn set_session_cookies(
    builder: &mut HttpResponseBuilder,
    session: &IssuedSession,
    settings: &CookieSettings,
) {
    builder
        .cookie(build(REFRESH_COOKIE, session.refresh_token.clone(), session.refresh_ttl, settings))
        .cookie(build(SESSION_COOKIE, session.session_id.clone(), session.refresh_ttl, settings));
}

pub fn clear_session_cookies(builder: &mut HttpResponseBuilder, settings: &CookieSettings) {
    for name in [REFRESH_COOKIE, SESSION_COOKIE] {
        let mut cookie = build(name, String::new(), chrono::Duration::zero(), settings);
        cookie.make_removal();
        builder.cookie(cookie);
    }
}

pub fn read(req: &HttpRequest, name: &str) -> Option<String> {
    req.cookie(name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}
