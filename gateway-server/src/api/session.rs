use crate::auth::pkce::random_string;
use crate::context::RequestContext;
use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use log::debug;

pub const SESSION_COOKIE: &str = "sid";

/// Browser session id resolved from the `sid` cookie
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: String,
    /// The cookie was issued by this response, the browser has not echoed it yet
    pub fresh: bool,
}

/// Ensures every request carries a session id, issuing the cookie when absent
pub(super) async fn session_middleware(
    ctx: RequestContext,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let existing = jar
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty());

    let (session, jar) = match existing {
        Some(id) => (Session { id, fresh: false }, None),
        None => {
            let id = random_string(32);
            debug!("[{}] Issuing new session cookie", ctx.request_id);
            let cookie = Cookie::build((SESSION_COOKIE, id.clone()))
                .http_only(true)
                .same_site(SameSite::Lax)
                .path("/");
            (Session { id, fresh: true }, Some(jar.add(cookie)))
        }
    };

    request.extensions_mut().insert(session);
    let response = next.run(request).await;
    match jar {
        Some(jar) => (jar, response).into_response(),
        None => response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, middleware, routing::get, Extension, Router};
    use http::header::{COOKIE, SET_COOKIE};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route(
                "/session",
                get(|Extension(session): Extension<Session>| async move {
                    format!("{}:{}", session.id, session.fresh)
                }),
            )
            .layer(middleware::from_fn(session_middleware))
    }

    async fn body_string(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_new_session_sets_cookie() {
        let request = Request::builder()
            .uri("/session")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();

        let set_cookie = response.headers()[SET_COOKIE].to_str().unwrap().to_string();
        assert!(set_cookie.starts_with("sid="));
        assert!(set_cookie.contains("HttpOnly"));
        assert!(set_cookie.contains("SameSite=Lax"));
        assert!(set_cookie.contains("Path=/"));
        assert!(!set_cookie.contains("Expires"));

        let sid = set_cookie
            .trim_start_matches("sid=")
            .split(';')
            .next()
            .unwrap()
            .to_string();
        assert_eq!(sid.len(), 43);
        assert_eq!(body_string(response).await, format!("{sid}:true"));
    }

    #[tokio::test]
    async fn test_existing_session_is_reused() {
        let request = Request::builder()
            .uri("/session")
            .header(COOKIE, "sid=abc123; other=1")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();

        assert!(response.headers().get(SET_COOKIE).is_none());
        assert_eq!(body_string(response).await, "abc123:false");
    }
}
