use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use mockall::automock;
use tracing::{debug, info, warn};
use url::Url;

use crate::server::dtos::stream_dto::StreamHeaders;
use crate::server::utils::key_line_utils::{count_key_lines, rewrite_key_uri};
use crate::server::utils::signature_utils::{KEY_URL_TTL_HOURS, KeyUrlSigner};

use super::dlhd_services::DlhdError;
use super::transport_services::{DynTransportClient, UpstreamRequest};

/// path segment of the key route, relative to the dlhd api base
pub const KEY_ENDPOINT: &str = "dlhd_key";

const MANIFEST_TIMEOUT: Duration = Duration::from_secs(10);
const KEY_TIMEOUT: Duration = Duration::from_secs(10);

pub type DynManifestService = Arc<dyn ManifestServiceTrait + Send + Sync>;

#[automock]
#[async_trait]
pub trait ManifestServiceTrait {
    /// upstream manifest with its key uri pointed at our key route
    async fn fetch_and_rewrite(
        &self,
        manifest_url: &str,
        key_url_template: &str,
        headers: &StreamHeaders,
        own_base_url: &str,
    ) -> Result<String, DlhdError>;

    /// raw key bytes, passed through untouched
    async fn fetch_key(&self, key_url: &str, headers: &StreamHeaders) -> Result<Bytes, DlhdError>;
}

pub struct ManifestService {
    transport: DynTransportClient,
    signer: Option<Arc<KeyUrlSigner>>,
}

impl ManifestService {
    pub fn new(transport: DynTransportClient, signer: Option<Arc<KeyUrlSigner>>) -> Self {
        Self { transport, signer }
    }

    /// `{base}/dlhd_key?keyUrl=..&h_User-Agent=..&h_Referer=..&h_Origin=..`, plus exp/sig when
    /// signing is on
    pub fn proxied_key_url(&self, own_base_url: &str, key_url: &str, headers: &StreamHeaders) -> String {
        let mut proxied = format!(
            "{}/{}?keyUrl={}&h_User-Agent={}&h_Referer={}&h_Origin={}",
            own_base_url.trim_end_matches('/'),
            KEY_ENDPOINT,
            urlencoding::encode(key_url),
            urlencoding::encode(&headers.user_agent),
            urlencoding::encode(&headers.referer),
            urlencoding::encode(&headers.origin),
        );

        if let Some(signer) = &self.signer {
            let expiry = KeyUrlSigner::expiry_from_now(KEY_URL_TTL_HOURS);
            proxied.push_str(&format!(
                "&exp={}&sig={}",
                expiry,
                signer.sign(key_url, expiry)
            ));
        }

        proxied
    }
}

/// key uris are usually absolute, relative ones hang off the manifest url
pub fn resolve_key_uri(manifest_url: &str, uri: &str) -> String {
    if uri.starts_with("http://") || uri.starts_with("https://") {
        return uri.to_string();
    }

    Url::parse(manifest_url)
        .and_then(|base| base.join(uri))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| uri.to_string())
}

#[async_trait]
impl ManifestServiceTrait for ManifestService {
    async fn fetch_and_rewrite(
        &self,
        manifest_url: &str,
        key_url_template: &str,
        headers: &StreamHeaders,
        own_base_url: &str,
    ) -> Result<String, DlhdError> {
        let request = UpstreamRequest::get(manifest_url)
            .headers(headers.pairs())
            .timeout(MANIFEST_TIMEOUT);
        let manifest = self.transport.fetch(&request).await?.text();

        let key_lines = count_key_lines(&manifest);
        if key_lines > 1 {
            warn!(
                "manifest {} has {} key lines, only the first is proxied",
                manifest_url, key_lines
            );
        }

        let rewritten = rewrite_key_uri(&manifest, |key| {
            let upstream = if key.uri().is_empty() {
                key_url_template.to_string()
            } else {
                resolve_key_uri(manifest_url, key.uri())
            };
            debug!("proxying key {} (template was {})", upstream, key_url_template);

            self.proxied_key_url(own_base_url, &upstream, headers)
        });

        match rewritten {
            Some(rewritten) => {
                info!("manifest {} rewritten", manifest_url);
                Ok(rewritten)
            }
            None => {
                warn!("no AES-128 key in {}, returning it untouched", manifest_url);
                Ok(manifest)
            }
        }
    }

    async fn fetch_key(&self, key_url: &str, headers: &StreamHeaders) -> Result<Bytes, DlhdError> {
        let request = UpstreamRequest::get(key_url)
            .headers(headers.pairs())
            .timeout(KEY_TIMEOUT);

        Ok(self.transport.fetch_pinned_bytes(&request).await?)
    }
}
