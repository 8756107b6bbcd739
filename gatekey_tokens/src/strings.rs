use std::fmt;

use aliri_braid::braid;

/// Implements `Debug` and `Display` so that the value is hidden behind a
/// placeholder unless the alternate form is requested, in which case at
/// most a small prefix is revealed.
macro_rules! guarded_reveal {
    ($ty:ty: $hidden:literal, $default:literal) => {
        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                if f.alternate() {
                    f.write_str("\"")?;
                    reveal_prefix(&self.0, &mut *f, $default)?;
                    f.write_str("\"")
                } else {
                    f.write_str(concat!("***", $hidden, "***"))
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                if f.alternate() {
                    reveal_prefix(&self.0, &mut *f, usize::MAX)
                } else {
                    f.write_str(concat!("***", $hidden, "***"))
                }
            }
        }
    };
}

fn reveal_prefix(unprotected: &str, f: &mut fmt::Formatter, default_len: usize) -> fmt::Result {
    let max_len = f.width().unwrap_or(default_len);
    if max_len <= 1 {
        f.write_str("…")
    } else if max_len > unprotected.len() {
        f.write_str(unprotected)
    } else {
        match unprotected.char_indices().nth(max_len - 2) {
            Some((idx, c)) if idx + c.len_utf8() < unprotected.len() => {
                f.write_str(&unprotected[0..idx + c.len_utf8()])?;
                f.write_str("…")
            }
            _ => f.write_str(unprotected),
        }
    }
}

/// An OAuth2 client identifier
#[braid(serde)]
pub struct ClientId;

/// An OAuth2 client secret
#[braid(serde, debug = "owned", display = "owned")]
pub struct ClientSecret;

guarded_reveal!(ClientSecretRef: "CLIENT SECRET", 5);

/// A single-use authorization code returned on the login callback
#[braid(serde, debug = "owned", display = "owned")]
pub struct AuthorizationCode;

guarded_reveal!(AuthorizationCodeRef: "AUTHORIZATION CODE", 5);

/// An access token issued by an authority
#[braid(serde, debug = "owned", display = "owned")]
pub struct AccessToken;

guarded_reveal!(AccessTokenRef: "ACCESS TOKEN", 15);

/// An OIDC ID token
#[braid(serde)]
pub struct IdToken;

/// A refresh token used to obtain fresh access tokens
#[braid(serde, debug = "owned", display = "owned")]
pub struct RefreshToken;

guarded_reveal!(RefreshTokenRef: "REFRESH TOKEN", 5);
