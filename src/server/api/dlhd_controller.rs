use axum::{
    Extension, Json, Router,
    extract::Query,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use std::io::Write;

use base64::{Engine as _, engine::general_purpose::URL_SAFE};
use flate2::{Compression, write::GzEncoder};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::server::{
    dtos::stream_dto::{StreamHeaders, StreamInfo},
    error::{AppResult, Error},
    extractors::OwnBaseUrl,
    services::{
        edge_services::EdgeServices, manifest_services::KEY_ENDPOINT,
        transport_services::DEFAULT_USER_AGENT,
    },
};

/// Supported compression encodings
#[derive(Debug, Clone, Copy, PartialEq)]
enum ContentEncoding {
    Zstd,
    Gzip,
    None,
}

impl ContentEncoding {
    /// hls players mostly send "gzip, deflate" or "identity", identity has to be respected
    fn from_accept_encoding(accept_encoding: Option<&str>) -> Self {
        let Some(v) = accept_encoding else {
            return Self::None;
        };

        if v == "identity" || v.starts_with("identity,") {
            return Self::None;
        }

        if v.contains("zstd") {
            Self::Zstd
        } else if v.contains("gzip") {
            Self::Gzip
        } else {
            Self::None
        }
    }

    fn as_header_value(&self) -> Option<&'static str> {
        match self {
            Self::Zstd => Some("zstd"),
            Self::Gzip => Some("gzip"),
            Self::None => None,
        }
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
        match self {
            Self::Zstd => zstd::encode_all(data, 3),
            Self::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(data)?;
                encoder.finish()
            }
            Self::None => Ok(data.to_vec()),
        }
    }
}

#[derive(Deserialize)]
struct ChannelQuery {
    url: String,
}

#[derive(Deserialize)]
struct KeyQuery {
    #[serde(rename = "keyUrl")]
    key_url: String,
    #[serde(rename = "h_User-Agent")]
    user_agent: Option<String>,
    #[serde(rename = "h_Referer")]
    referer: Option<String>,
    #[serde(rename = "h_Origin")]
    origin: Option<String>,
    exp: Option<i64>,
    sig: Option<String>,
}

pub struct DlhdController;

impl DlhdController {
    pub fn app() -> Router {
        Router::new()
            .route("/resolve", get(Self::resolve))
            .route("/manifest.m3u8", get(Self::manifest))
            .route(&format!("/{}", KEY_ENDPOINT), get(Self::key))
    }

    async fn resolve(
        Extension(services): Extension<EdgeServices>,
        Query(params): Query<ChannelQuery>,
    ) -> AppResult<Json<StreamInfo>> {
        let channel_url = Self::decode_url(&params.url)?;
        let stream = services.dlhd.resolve(&channel_url).await?;

        Ok(Json(stream))
    }

    async fn manifest(
        Extension(services): Extension<EdgeServices>,
        OwnBaseUrl(own_base_url): OwnBaseUrl,
        Query(params): Query<ChannelQuery>,
        headers: HeaderMap,
    ) -> AppResult<Response> {
        let channel_url = Self::decode_url(&params.url)?;
        let stream = services.dlhd.resolve(&channel_url).await?;

        let manifest = services
            .manifests
            .fetch_and_rewrite(
                &stream.manifest_url,
                &stream.key_url,
                &stream.headers,
                &own_base_url,
            )
            .await?;

        info!("serving manifest for {}", channel_url);
        Self::build_m3u8_response(&manifest, &headers)
    }

    async fn key(
        Extension(services): Extension<EdgeServices>,
        Query(params): Query<KeyQuery>,
    ) -> AppResult<Response> {
        if !Self::is_http(&params.key_url) {
            return Err(Error::BadRequest("Invalid key URL".to_string()));
        }

        if let Some(signer) = &services.key_signer {
            let (Some(exp), Some(sig)) = (params.exp, params.sig.as_deref()) else {
                return Err(Error::Unauthorized);
            };
            if !signer.verify(&params.key_url, exp, sig) {
                warn!("rejected key request with a bad or expired signature");
                return Err(Error::Unauthorized);
            }
        }

        let headers = StreamHeaders {
            user_agent: params
                .user_agent
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            referer: params
                .referer
                .ok_or_else(|| Error::BadRequest("missing h_Referer".to_string()))?,
            origin: params
                .origin
                .ok_or_else(|| Error::BadRequest("missing h_Origin".to_string()))?,
        };

        let key = services.manifests.fetch_key(&params.key_url, &headers).await?;
        debug!("key {} bytes from {}", key.len(), params.key_url);

        Ok((
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/octet-stream"),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            key,
        )
            .into_response())
    }

    /// m3u8 response with proper headers and optional compression
    fn build_m3u8_response(manifest: &str, headers: &HeaderMap) -> AppResult<Response> {
        let encoding = ContentEncoding::from_accept_encoding(
            headers
                .get(header::ACCEPT_ENCODING)
                .and_then(|v| v.to_str().ok()),
        );

        let mut response_headers = HeaderMap::new();
        response_headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/vnd.apple.mpegurl"),
        );
        response_headers.insert(
            header::CACHE_CONTROL,
            header::HeaderValue::from_static("no-cache"),
        );

        let body = encoding.compress(manifest.as_bytes()).map_err(|e| {
            error!("Failed to compress response with {:?}: {}", encoding, e);
            Error::InternalServerErrorWithContext("Failed to compress response".to_string())
        })?;

        if let Some(enc) = encoding.as_header_value() {
            debug!(
                "Compressed M3U8 with {:?} from {} to {} bytes",
                encoding,
                manifest.len(),
                body.len()
            );
            response_headers.insert(header::CONTENT_ENCODING, header::HeaderValue::from_static(enc));
        }

        response_headers.insert(header::CONTENT_LENGTH, header::HeaderValue::from(body.len()));

        Ok((StatusCode::OK, response_headers, body).into_response())
    }

    fn is_http(url: &str) -> bool {
        url.starts_with("http://") || url.starts_with("https://")
    }

    // plain urls come through already decoded by Query, anything else is url safe base64
    fn decode_url(url_param: &str) -> AppResult<String> {
        let url = if Self::is_http(url_param) {
            url_param.to_string()
        } else {
            let mut padded = url_param.trim().to_string();
            while !padded.len().is_multiple_of(4) {
                padded.push('=');
            }

            let bytes = URL_SAFE.decode(&padded).map_err(|e| {
                error!("Failed to decode base64: {}", e);
                Error::BadRequest("Invalid URL encoding".to_string())
            })?;

            String::from_utf8(bytes).map_err(|e| {
                error!("Failed to parse UTF-8: {}", e);
                Error::BadRequest("Invalid URL encoding".to_string())
            })?
        };

        if !Self::is_http(&url) {
            return Err(Error::BadRequest("Invalid URL format".to_string()));
        }

        Ok(url)
    }
}
