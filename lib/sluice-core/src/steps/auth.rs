//! The `auth` step.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::{Auth, Error, RequestContext, Result};

pub(super) fn auth(request: &mut RequestContext) -> Result<()> {
    let Some(auth) = request.options().auth.clone() else {
        return Ok(());
    };

    let value = match &auth {
        Auth::Basic { username, password } => {
            if username.contains(':') {
                return Err(Error::config("basic auth username must not contain ':'"));
            }
            basic(&format!("{username}:{password}"))
        }
        Auth::BasicEncoded(credentials) => {
            if !credentials.contains(':') {
                return Err(Error::config(
                    "basic auth credentials must be formatted as 'user:password'",
                ));
            }
            basic(credentials)
        }
        Auth::Bearer(token) => {
            if token.trim().is_empty() {
                return Err(Error::config("bearer token must not be empty"));
            }
            format!("Bearer {token}")
        }
        Auth::Custom(produce) => {
            produce(request).map_err(|message| Error::config(format!("auth failed: {message}")))?
        }
    };

    request.headers_mut().insert("authorization", value);
    Ok(())
}

/// `Basic` header value for `user:password` credentials.
pub(super) fn basic(credentials: &str) -> String {
    format!("Basic {}", STANDARD.encode(credentials))
}
