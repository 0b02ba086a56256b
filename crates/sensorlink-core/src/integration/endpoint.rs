// Endpoint normalization for operator-supplied backend URLs.

use url::Url;

use crate::error::CoreError;

fn invalid(input: &str, reason: impl Into<String>) -> CoreError {
    CoreError::InvalidEndpoint {
        input: input.to_owned(),
        reason: reason.into(),
    }
}

fn has_http_scheme(candidate: &str) -> bool {
    let lower = candidate.get(..8).unwrap_or(candidate).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Turn operator input into an absolute `http(s)` base URL.
///
/// Input without a scheme is treated as `http://`. Query strings and
/// fragments are dropped, as are trailing slashes on the path:
/// `example.com:4000/` becomes `http://example.com:4000`.
pub fn normalize_endpoint(raw: &str) -> Result<String, CoreError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid(raw, "endpoint is empty"));
    }

    let candidate = if has_http_scheme(trimmed) {
        trimmed.to_owned()
    } else {
        format!("http://{trimmed}")
    };

    let url = Url::parse(&candidate).map_err(|e| invalid(raw, format!("not a valid URL ({e})")))?;
    let origin = url.origin();
    if !origin.is_tuple() {
        return Err(invalid(raw, "URL has no host"));
    }

    let origin = origin.ascii_serialization();
    let joined = format!("{origin}{}", url.path());
    let base = joined.trim_end_matches('/');
    Ok(if base.is_empty() { origin } else { base.to_owned() })
}
