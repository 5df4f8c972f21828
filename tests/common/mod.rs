// shared fake upstream, every test binary pulls in only the bits it needs
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use bytes::Bytes;
use reqwest::StatusCode;

use dlhd_edge::server::services::proxy_pool_services::ProxyPool;
use dlhd_edge::server::services::transport_services::{
    DynTransportClient, HttpExecutor, TransportClient, TransportError, TransportMethod,
    TransportState, UpstreamRequest, UpstreamResponse,
};

pub const CHANNEL_PAGE: &str = "https://dlhd.dad/watch.php?id=881";
pub const SITE_BASE: &str = "https://dlhd.dad/";
pub const PLAYER_ONE: &str = "https://dlhd.dad/player/stream-881.php";
pub const PLAYER_TWO: &str = "https://dlhd.dad/cast/stream-881.php";
pub const DEAD_IFRAME: &str = "https://dead.example/premiumtv/daddyhd.php?id=881";
pub const LIVE_IFRAME: &str = "https://live.example/premiumtv/daddyhd.php?id=881";
pub const AUTH_ENDPOINT: &str = "https://auth.example/auth.php";
pub const LOOKUP_URL: &str = "https://live.example/server_lookup.js?channel_id=premium881";
pub const MANIFEST_URL: &str = "https://wind.newkso.ru/wind/premium881/mono.m3u8";

/// canned responses keyed by url, records every request it sees
#[derive(Default)]
pub struct FakeUpstream {
    routes: HashMap<String, (StatusCode, Bytes)>,
    block_direct: bool,
    calls: Mutex<Vec<(TransportMethod, UpstreamRequest)>>,
}

impl FakeUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, url: &str, body: impl Into<Bytes>) -> Self {
        self.routes
            .insert(url.to_string(), (StatusCode::OK, body.into()));
        self
    }

    pub fn status(mut self, url: &str, status: StatusCode) -> Self {
        self.routes
            .insert(url.to_string(), (status, Bytes::from_static(b"nope")));
        self
    }

    /// every direct request gets a 403, proxied ones are served normally
    pub fn block_direct(mut self) -> Self {
        self.block_direct = true;
        self
    }

    pub fn calls(&self) -> Vec<(TransportMethod, UpstreamRequest)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn direct_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|(m, _)| *m == TransportMethod::Direct)
            .count()
    }

    /// requests for `url`, query string ignored when `url` has none
    pub fn requests_to(&self, url: &str) -> Vec<UpstreamRequest> {
        self.calls()
            .into_iter()
            .map(|(_, r)| r)
            .filter(|r| r.url == url || r.url.split('?').next() == Some(url))
            .collect()
    }
}

#[async_trait]
impl HttpExecutor for FakeUpstream {
    async fn execute(
        &self,
        method: &TransportMethod,
        request: &UpstreamRequest,
    ) -> Result<UpstreamResponse, TransportError> {
        self.calls
            .lock()
            .unwrap()
            .push((method.clone(), request.clone()));

        if self.block_direct && *method == TransportMethod::Direct {
            return Ok(UpstreamResponse::new(
                StatusCode::FORBIDDEN,
                request.url.clone(),
                "blocked",
            ));
        }

        let without_query = request.url.split('?').next().unwrap_or_default();
        let (status, body) = self
            .routes
            .get(&request.url)
            .or_else(|| self.routes.get(without_query))
            .cloned()
            .unwrap_or((StatusCode::NOT_FOUND, Bytes::from_static(b"not found")));

        Ok(UpstreamResponse::new(status, request.url.clone(), body))
    }
}

pub fn transport_over(
    upstream: &Arc<FakeUpstream>,
    pool: &[&str],
    env_proxy: Option<&str>,
) -> DynTransportClient {
    Arc::new(TransportClient::new(
        upstream.clone(),
        Arc::new(TransportState::new()),
        Arc::new(ProxyPool::new(pool.iter().map(|p| p.to_string()).collect())),
        env_proxy.map(str::to_string),
    ))
}

/// the auth blob the way the site ships it: json in base64, every value base64 again
pub fn auth_blob(with_signature: bool) -> String {
    let mut record = serde_json::json!({
        "b_host": STANDARD.encode("https://auth.example/"),
        "b_script": STANDARD.encode("a.php"),
        "b_ts": STANDARD.encode("1700000000"),
        "b_rnd": STANDARD.encode("abc123"),
    });
    if with_signature {
        record["b_sig"] = serde_json::Value::String(STANDARD.encode("deadbeefsig"));
    }

    STANDARD.encode(record.to_string())
}

pub fn iframe_script(with_channel_key: bool, with_signature: bool) -> String {
    let channel_key = if with_channel_key {
        r#"const CHANNEL_KEY = "premium881";"#
    } else {
        ""
    };

    format!(
        r#"<html><body><script>
        {channel_key}
        const XJZ_PAYLOAD = "{blob}";
        fetchWithRetry('/server_lookup.js?channel_id=' + CHANNEL_KEY);
        </script></body></html>"#,
        blob = auth_blob(with_signature),
    )
}

/// whole site for channel 881, player one only knows a dead iframe when `with_dead_iframe`
pub fn dlhd_upstream(with_dead_iframe: bool) -> FakeUpstream {
    let player_one = if with_dead_iframe {
        format!(r#"<iframe src="{}"></iframe>"#, DEAD_IFRAME)
    } else {
        format!(r#"<iframe src="{}"></iframe>"#, LIVE_IFRAME)
    };

    FakeUpstream::new()
        .route(SITE_BASE, "<html>home</html>")
        .route(
            CHANNEL_PAGE,
            r#"<html><body>
            <button data-url="/player/stream-881.php">Player 1</button>
            <button data-url="https://dlhd.dad/cast/stream-881.php">Player 2</button>
            <button data-url="/chat">Chat</button>
            </body></html>"#,
        )
        .route(PLAYER_ONE, player_one)
        .route(
            PLAYER_TWO,
            format!(r#"<iframe src="{}"></iframe>"#, LIVE_IFRAME),
        )
        .route(LIVE_IFRAME, iframe_script(true, true))
        .route(AUTH_ENDPOINT, "ok")
        .route(LOOKUP_URL, r#"{"server_key":"wind/"}"#)
}

pub fn manifest_with_key(key_line: &str) -> String {
    format!(
        "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:4\n#EXT-X-MEDIA-SEQUENCE:100\n{}\n#EXTINF:4.0,\nhttps://cdn.example/seg100.ts\n#EXTINF:4.0,\nhttps://cdn.example/seg101.ts\n",
        key_line
    )
}
