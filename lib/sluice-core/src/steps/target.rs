//! URL steps: `put_base_url`, `put_params`.

use url::Url;

use crate::request::Target;
use crate::{Error, RequestContext, Result};

/// Resolve a relative URL by appending it to `base_url`.
pub(super) fn put_base_url(request: &mut RequestContext) -> Result<()> {
    let Target::Relative(path) = request.url() else {
        return Ok(());
    };
    let Some(base) = request.options().base_url.as_deref() else {
        return Ok(());
    };

    let joined = join(base, path);
    let url = Url::parse(&joined)
        .map_err(|e| Error::config(format!("invalid URL {joined:?}: {e}")))?;
    request.set_url(url);
    Ok(())
}

fn join(base: &str, path: &str) -> String {
    if path.is_empty() {
        return base.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Append the `params` option to the query, once per call.
pub(super) fn put_params(request: &mut RequestContext) -> Result<()> {
    if request.params_applied() || request.options().params.is_empty() {
        return Ok(());
    }
    let Some(url) = request.url().as_absolute() else {
        return Ok(());
    };

    let mut url = url.clone();
    url.query_pairs_mut()
        .extend_pairs(&request.options().params);
    request.set_url(url);
    request.mark_params_applied();
    Ok(())
}
