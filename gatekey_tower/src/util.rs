//! Response builders for authentication and authorization failures

use gatekey_oauth2::{Scope, ScopePolicy};
use http::{header, HeaderValue, Response, StatusCode};

/// Builds a `401 Unauthorized` response with the appropriate
/// `www-authenticate` challenge
///
/// The description is escaped so that it is always header-safe.
///
/// ```http
/// HTTP/1.1 401 Unauthorized
/// www-authenticate: Bearer error="invalid_token" error_description="{description}"
/// ```
///
/// `error_description` is omitted when `description` is empty.
pub fn unauthorized<Body: Default>(description: &str) -> Response<Body> {
    let mut resp = Response::new(Body::default());
    *resp.status_mut() = StatusCode::UNAUTHORIZED;
    resp.headers_mut()
        .insert(header::WWW_AUTHENTICATE, invalid_token(description));
    resp
}

/// Builds a `403 Forbidden` response with the appropriate
/// `www-authenticate` challenge(s)
///
/// The description is escaped so that it is always header-safe. When a
/// policy is given, one `www-authenticate` header is added per scope
/// alternative the policy would accept:
///
/// ```http
/// HTTP/1.1 403 Forbidden
/// www-authenticate: Bearer error="insufficient_scope" error_description="{description}" scope="get_user"
/// www-authenticate: Bearer error="insufficient_scope" error_description="{description}" scope="admin"
/// ```
///
/// `error_description` is omitted when `description` is empty.
pub fn forbidden<Body: Default>(description: &str, policy: Option<&ScopePolicy>) -> Response<Body> {
    let mut resp = Response::new(Body::default());
    *resp.status_mut() = StatusCode::FORBIDDEN;

    match policy {
        Some(policy) if policy != &ScopePolicy::deny_all() => {
            for scope in policy {
                resp.headers_mut().append(
                    header::WWW_AUTHENTICATE,
                    insufficient_scope(description, Some(scope)),
                );
            }
        }
        _ => {
            resp.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                insufficient_scope(description, None),
            );
        }
    }

    resp
}

fn invalid_token(description: &str) -> HeaderValue {
    if description.is_empty() {
        HeaderValue::from_static(r#"Bearer error="invalid_token""#)
    } else {
        HeaderValue::try_from(format!(
            r#"Bearer error="invalid_token" error_description="{}""#,
            description.escape_default()
        ))
        .expect("escaped description is a valid header value")
    }
}

// A `Scope` cannot contain `\`, `"`, or non-printable characters, so its
// rendering never needs further escaping to remain a valid header value.
fn insufficient_scope(description: &str, scope: Option<&Scope>) -> HeaderValue {
    let mut challenge = String::from(r#"Bearer error="insufficient_scope""#);

    if !description.is_empty() {
        challenge.push_str(&format!(
            r#" error_description="{}""#,
            description.escape_default()
        ));
    }

    if let Some(scope) = scope {
        let tokens: Vec<_> = scope.iter().map(|t| t.as_str()).collect();
        challenge.push_str(&format!(r#" scope="{}""#, tokens.join(" ")));
    }

    HeaderValue::try_from(challenge).expect("escaped challenge is a valid header value")
}
