// dlhd channel resolution
//
// channel page -> player buttons -> iframes -> auth params out of the live iframe -> auth call ->
// server lookup -> manifest + key template. every network hop goes through the adaptive transport
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mockall::automock;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::AppConfig;
use crate::server::dtos::stream_dto::{StreamHeaders, StreamInfo};
use crate::server::utils::auth_params_utils::{AuthParameters, extract_auth_params};
use crate::server::utils::dlhd_page_utils::{
    absolutize, build_auth_url, build_key_url_template, build_manifest_url, extract_channel_id,
    extract_channel_key, extract_iframe_sources, extract_player_links, origin_of,
    server_lookup_path,
};

use super::transport_services::{
    DEFAULT_USER_AGENT, DynTransportClient, TransportError, UpstreamRequest,
};

pub const DEFAULT_DOMAINS: [&str; 2] = ["https://daddylive.sx/", "https://dlhd.dad/"];
pub const DEFAULT_CDN_DOMAIN: &str = "newkso.ru";

const DOMAIN_TIMEOUT: Duration = Duration::from_secs(10);
const PAGE_TIMEOUT: Duration = Duration::from_secs(15);
const PLAYER_TIMEOUT: Duration = Duration::from_secs(12);
const IFRAME_TIMEOUT: Duration = Duration::from_secs(12);
const AUTH_TIMEOUT: Duration = Duration::from_secs(12);
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// reported first in the missing list when the iframe has no channel key
pub const CHANNEL_KEY_FIELD: &str = "channel_key";

pub type DynDlhdService = Arc<dyn DlhdServiceTrait + Send + Sync>;

#[derive(Debug, Error)]
pub enum DlhdError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("channel id not found in {0}")]
    ChannelIdNotFound(String),

    #[error("no player links on {0}")]
    NoPlayerLinks(String),

    #[error("no working iframe ({0} candidates tried)")]
    NoWorkingIframe(usize),

    #[error("missing auth parameters: {}", .0.join(", "))]
    MissingAuthParameters(Vec<&'static str>),

    #[error("auth request failed: {0}")]
    AuthRequestFailed(#[source] TransportError),

    #[error("no server_key in response: {0}")]
    NoServerKey(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone)]
pub struct DlhdSettings {
    /// candidate site bases, tried in order after the one the input url points at
    pub domains: Vec<String>,
    pub cdn_domain: String,
    pub user_agent: String,
}

impl Default for DlhdSettings {
    fn default() -> Self {
        Self {
            domains: DEFAULT_DOMAINS.iter().map(|d| d.to_string()).collect(),
            cdn_domain: DEFAULT_CDN_DOMAIN.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl DlhdSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let defaults = Self::default();

        let domains: Vec<String> = config
            .dlhd_domains
            .iter()
            .map(|d| d.trim())
            .filter(|d| !d.is_empty())
            .map(|d| {
                if d.ends_with('/') {
                    d.to_string()
                } else {
                    format!("{}/", d)
                }
            })
            .collect();

        let cdn_domain = config.dlhd_cdn_domain.trim().trim_matches('.');

        Self {
            domains: if domains.is_empty() {
                defaults.domains
            } else {
                domains
            },
            cdn_domain: if cdn_domain.is_empty() {
                defaults.cdn_domain
            } else {
                cdn_domain.to_string()
            },
            user_agent: defaults.user_agent,
        }
    }
}

#[automock]
#[async_trait]
pub trait DlhdServiceTrait {
    /// channel page url in, manifest url + key template + the headers to use with them out
    async fn resolve(&self, channel_page_url: &str) -> Result<StreamInfo, DlhdError>;
}

/// the iframe that actually loaded, plus the bits of its url the later steps need
struct LiveIframe {
    url: String,
    origin: String,
    host: String,
    content: String,
}

#[derive(Deserialize)]
struct ServerLookupResponse {
    server_key: Option<String>,
}

pub struct DlhdService {
    transport: DynTransportClient,
    settings: DlhdSettings,
}

impl DlhdService {
    pub fn new(transport: DynTransportClient, settings: DlhdSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    /// configured domain the input url already lives on, if any
    fn preferred_domain(&self, channel_page_url: &str) -> Option<&str> {
        let host = Url::parse(channel_page_url)
            .ok()?
            .host_str()?
            .to_ascii_lowercase();

        self.settings
            .domains
            .iter()
            .map(String::as_str)
            .find(|domain| {
                Url::parse(domain)
                    .ok()
                    .and_then(|d| d.host_str().map(|h| host.ends_with(&h.to_ascii_lowercase())))
                    .unwrap_or(false)
            })
    }

    /// first reachable site base after redirects, always with a trailing slash
    ///
    /// an unreachable site isn't fatal here, the first candidate is used and the page fetch
    /// reports the real error
    async fn resolve_base_url(&self, channel_page_url: &str) -> String {
        let preferred = self.preferred_domain(channel_page_url);
        let candidates: Vec<&str> = preferred
            .into_iter()
            .chain(
                self.settings
                    .domains
                    .iter()
                    .map(String::as_str)
                    .filter(|d| Some(*d) != preferred),
            )
            .collect();

        for candidate in &candidates {
            let request = UpstreamRequest::get(*candidate)
                .header("User-Agent", self.settings.user_agent.as_str())
                .timeout(DOMAIN_TIMEOUT);

            match self.transport.fetch(&request).await {
                Ok(response) => {
                    let mut base = if response.final_url.is_empty() {
                        candidate.to_string()
                    } else {
                        response.final_url
                    };
                    if !base.ends_with('/') {
                        base.push('/');
                    }
                    debug!("dlhd domain resolved: {}", base);
                    return base;
                }
                Err(e) => debug!("dlhd domain {} unreachable: {}", candidate, e),
            }
        }

        let fallback = candidates
            .first()
            .copied()
            .unwrap_or(DEFAULT_DOMAINS[0])
            .to_string();
        warn!("no dlhd domain reachable, falling back to {}", fallback);
        fallback
    }

    fn site_headers(&self, base_url: &str) -> Vec<(&'static str, String)> {
        let origin = origin_of(base_url).unwrap_or_else(|| base_url.trim_end_matches('/').to_string());
        vec![
            ("User-Agent", self.settings.user_agent.clone()),
            ("Referer", base_url.to_string()),
            ("Origin", origin),
        ]
    }

    /// iframe urls from every player page, deduplicated and in discovery order
    async fn collect_iframes(&self, player_links: &[String], base_url: &str) -> Vec<String> {
        let mut iframes: Vec<String> = Vec::new();

        for link in player_links {
            let player_url = absolutize(link, base_url);
            let request = UpstreamRequest::get(&player_url)
                .header("User-Agent", self.settings.user_agent.as_str())
                .header("Referer", player_url.as_str())
                .header("Origin", player_url.as_str())
                .timeout(PLAYER_TIMEOUT);

            match self.transport.fetch(&request).await {
                Ok(response) => {
                    for src in extract_iframe_sources(&response.text()) {
                        if !iframes.contains(&src) {
                            iframes.push(src);
                        }
                    }
                }
                Err(e) => warn!("player page {} failed: {}", player_url, e),
            }
        }

        iframes
    }

    async fn select_iframe(
        &self,
        iframes: &[String],
        site_headers: &[(&'static str, String)],
    ) -> Result<LiveIframe, DlhdError> {
        for candidate in iframes {
            let Ok(parsed) = Url::parse(candidate) else {
                debug!("skipping unparseable iframe url {}", candidate);
                continue;
            };
            let Some(host) = parsed.host_str().map(str::to_string) else {
                continue;
            };

            let request = UpstreamRequest::get(candidate.as_str())
                .headers(site_headers.iter().cloned())
                .timeout(IFRAME_TIMEOUT);

            match self.transport.fetch(&request).await {
                Ok(response) => {
                    debug!("iframe {} loaded", candidate);
                    return Ok(LiveIframe {
                        url: candidate.clone(),
                        origin: parsed.origin().ascii_serialization(),
                        host,
                        content: response.text(),
                    });
                }
                Err(e) => debug!("iframe {} failed: {}", candidate, e),
            }
        }

        Err(DlhdError::NoWorkingIframe(iframes.len()))
    }

    async fn authenticate(
        &self,
        params: &AuthParameters,
        channel_key: &str,
        iframe: &LiveIframe,
    ) -> Result<(), DlhdError> {
        let auth_url = build_auth_url(params, channel_key)
            .ok_or_else(|| DlhdError::MissingAuthParameters(params.missing()))?
            .map_err(|e| DlhdError::InvalidUrl(format!("auth url: {}", e)))?;

        let request = UpstreamRequest::get(auth_url.as_str())
            .header("User-Agent", self.settings.user_agent.as_str())
            .header("Referer", iframe.url.as_str())
            .header("Origin", iframe.origin.as_str())
            .timeout(AUTH_TIMEOUT);

        self.transport.fetch(&request).await.map_err(|e| {
            error!("dlhd auth request failed: {}", e);
            DlhdError::AuthRequestFailed(e)
        })?;

        Ok(())
    }

    async fn lookup_server_key(
        &self,
        iframe: &LiveIframe,
        channel_key: &str,
        site_headers: &[(&'static str, String)],
    ) -> Result<String, DlhdError> {
        let path = server_lookup_path(&iframe.content);
        let lookup_url = if path.starts_with("http://") || path.starts_with("https://") {
            format!("{}{}", path, channel_key)
        } else {
            format!("https://{}/{}{}", iframe.host, path.trim_start_matches('/'), channel_key)
        };

        let request = UpstreamRequest::get(lookup_url.as_str())
            .headers(site_headers.iter().cloned())
            .timeout(LOOKUP_TIMEOUT);
        let response = self.transport.fetch(&request).await?;

        response
            .json::<ServerLookupResponse>()
            .ok()
            .and_then(|r| r.server_key)
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or_else(|| DlhdError::NoServerKey(response.text().chars().take(200).collect()))
    }
}

#[async_trait]
impl DlhdServiceTrait for DlhdService {
    async fn resolve(&self, channel_page_url: &str) -> Result<StreamInfo, DlhdError> {
        info!("resolving dlhd channel: {}", channel_page_url);

        let base_url = self.resolve_base_url(channel_page_url).await;

        let channel_id = extract_channel_id(channel_page_url)
            .ok_or_else(|| DlhdError::ChannelIdNotFound(channel_page_url.to_string()))?;
        debug!("dlhd channel id: {}", channel_id);

        let site_headers = self.site_headers(&base_url);

        let page_url = absolutize(channel_page_url, &base_url);
        let page_request = UpstreamRequest::get(page_url.as_str())
            .headers(site_headers.iter().cloned())
            .timeout(PAGE_TIMEOUT);
        let page = self.transport.fetch(&page_request).await?;

        let player_links = extract_player_links(&page.text());
        if player_links.is_empty() {
            return Err(DlhdError::NoPlayerLinks(page_url));
        }
        debug!("{} player links on {}", player_links.len(), page_url);

        let iframes = self.collect_iframes(&player_links, &base_url).await;
        let iframe = self.select_iframe(&iframes, &site_headers).await?;

        let params = extract_auth_params(&iframe.content);
        let channel_key = extract_channel_key(&iframe.content);

        let mut missing = Vec::new();
        if channel_key.is_none() {
            missing.push(CHANNEL_KEY_FIELD);
        }
        missing.extend(params.missing());

        let Some(channel_key) = channel_key.filter(|_| missing.is_empty()) else {
            error!("iframe {} is missing {}", iframe.url, missing.join(", "));
            return Err(DlhdError::MissingAuthParameters(missing));
        };

        self.authenticate(&params, &channel_key, &iframe).await?;

        let server_key = self
            .lookup_server_key(&iframe, &channel_key, &site_headers)
            .await?;

        let manifest_url = build_manifest_url(&server_key, &channel_key, &self.settings.cdn_domain);
        let key_url = build_key_url_template(&manifest_url, &channel_key);
        info!(
            "dlhd channel {} resolved to {} (server {})",
            channel_id, manifest_url, server_key
        );

        Ok(StreamInfo {
            manifest_url,
            key_url,
            headers: StreamHeaders {
                user_agent: self.settings.user_agent.clone(),
                referer: iframe.url,
                origin: iframe.origin,
            },
        })
    }
}
