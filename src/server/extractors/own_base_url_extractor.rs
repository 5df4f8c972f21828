use axum::Extension;
use axum::extract::FromRequestParts;
use axum::http::header::HOST;
use axum::http::request::Parts;
use tracing::debug;

use crate::server::API_PREFIX;
use crate::server::error::Error;
use crate::server::services::edge_services::EdgeServices;

/// base url the rewritten key uris point back at, dlhd api prefix included and no trailing slash
pub struct OwnBaseUrl(pub String);

/// configured PUBLIC_BASE_URL wins, otherwise it's rebuilt from the proxy headers
impl<S> FromRequestParts<S> for OwnBaseUrl
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Extension(services): Extension<EdgeServices> =
            Extension::from_request_parts(parts, state)
                .await
                .map_err(|err| Error::InternalServerErrorWithContext(err.to_string()))?;

        if let Some(configured) = services
            .config
            .public_base_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
        {
            return Ok(Self(configured.trim_end_matches('/').to_string()));
        }

        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|h| h.to_str().ok())
                // first hop only when a chain of proxies appended to it
                .and_then(|s| s.split(',').next())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };

        let host = header("x-forwarded-host")
            .or_else(|| header(HOST.as_str()))
            .or_else(|| parts.uri.authority().map(|a| a.to_string()))
            .ok_or_else(|| Error::BadRequest("missing Host header".to_string()))?;

        let proto = header("x-forwarded-proto")
            .or_else(|| parts.uri.scheme_str().map(str::to_string))
            .unwrap_or_else(|| "http".to_string());

        let base = format!("{}://{}{}", proto, host, API_PREFIX);
        debug!("own base url from headers: {}", base);

        Ok(Self(base))
    }
}
