use std::sync::Arc;

use reqwest::StatusCode;

use dlhd_edge::server::services::dlhd_services::{
    DlhdError, DlhdService, DlhdServiceTrait, DlhdSettings,
};
use dlhd_edge::server::services::transport_services::TransportMethod;

mod common;

use common::{
    AUTH_ENDPOINT, CHANNEL_PAGE, DEAD_IFRAME, FakeUpstream, LIVE_IFRAME, LOOKUP_URL, MANIFEST_URL,
    PLAYER_TWO, SITE_BASE, dlhd_upstream, iframe_script, transport_over,
};

const POOL: [&str; 2] = ["http://p1:8080", "http://p2:8080"];

fn service(upstream: &Arc<FakeUpstream>, pool: &[&str]) -> DlhdService {
    DlhdService::new(transport_over(upstream, pool, None), DlhdSettings::default())
}

#[tokio::test]
async fn test_resolves_through_a_dead_iframe_to_the_manifest() {
    let upstream = Arc::new(dlhd_upstream(true));

    let stream = service(&upstream, &[]).resolve(CHANNEL_PAGE).await.unwrap();

    assert_eq!(stream.manifest_url, MANIFEST_URL);
    assert_eq!(
        stream.key_url,
        "https://wind.newkso.ru/wind/wmsxx.php?test=true&name=premium881&number=1"
    );
    assert_eq!(stream.headers.referer, LIVE_IFRAME);
    assert_eq!(stream.headers.origin, "https://live.example");
    assert!(stream.headers.user_agent.starts_with("Mozilla/5.0"));

    // the dead iframe was tried before the live one
    assert_eq!(upstream.requests_to(DEAD_IFRAME).len(), 2);
    assert!(!upstream.requests_to(LIVE_IFRAME).is_empty());
}

#[tokio::test]
async fn test_dead_iframe_behind_the_env_proxy_keeps_the_proxy() {
    let upstream = Arc::new(dlhd_upstream(true).block_direct());
    let transport = transport_over(&upstream, &[], Some("http://env:3128"));
    let service = DlhdService::new(transport.clone(), DlhdSettings::default());

    let stream = service.resolve(CHANNEL_PAGE).await.unwrap();

    assert_eq!(stream.manifest_url, MANIFEST_URL);
    assert!(!transport.state().env_proxy_suppressed());
    assert_eq!(
        transport.state().cached_method(),
        Some(TransportMethod::EnvProxy("http://env:3128".to_string()))
    );
}

#[tokio::test]
async fn test_auth_request_carries_params_and_iframe_headers() {
    let upstream = Arc::new(dlhd_upstream(true));

    service(&upstream, &[]).resolve(CHANNEL_PAGE).await.unwrap();

    let auth = upstream.requests_to(AUTH_ENDPOINT);
    assert_eq!(auth.len(), 1);
    assert_eq!(
        auth[0].url,
        "https://auth.example/auth.php?channel_id=premium881&ts=1700000000&rnd=abc123&sig=deadbeefsig"
    );
    assert_eq!(auth[0].header_value("Referer"), Some(LIVE_IFRAME));
    assert_eq!(auth[0].header_value("Origin"), Some("https://live.example"));

    let lookup = upstream.requests_to(LOOKUP_URL);
    assert_eq!(lookup.len(), 1);
    assert_eq!(lookup[0].header_value("Referer"), Some(SITE_BASE));
}

#[tokio::test]
async fn test_second_resolve_reuses_the_cached_transport() {
    let upstream = Arc::new(dlhd_upstream(false).block_direct());
    let service = service(&upstream, &POOL);

    let first = service.resolve(CHANNEL_PAGE).await.unwrap();
    let direct_after_first = upstream.direct_calls();
    let calls_after_first = upstream.calls().len();

    let second = service.resolve(CHANNEL_PAGE).await.unwrap();

    assert_eq!(first, second);
    // only the very first request went direct, then the pool proxy stuck
    assert_eq!(direct_after_first, 1);
    assert_eq!(upstream.direct_calls(), 1);

    // every request of the second run went straight through the cached proxy
    let calls = upstream.calls();
    assert!(
        calls[calls_after_first..]
            .iter()
            .all(|(m, _)| *m == TransportMethod::PoolProxy(POOL[0].to_string()))
    );
}

#[tokio::test]
async fn test_every_missing_field_is_named() {
    let upstream = Arc::new(dlhd_upstream(false).route(LIVE_IFRAME, iframe_script(false, false)));

    let err = service(&upstream, &[])
        .resolve(CHANNEL_PAGE)
        .await
        .unwrap_err();

    assert!(matches!(
        &err,
        DlhdError::MissingAuthParameters(missing) if *missing == vec!["channel_key", "auth_sig"]
    ));
    assert_eq!(
        err.to_string(),
        "missing auth parameters: channel_key, auth_sig"
    );
    assert!(upstream.requests_to(AUTH_ENDPOINT).is_empty());
}

#[tokio::test]
async fn test_unknown_url_shape_has_no_channel_id() {
    let upstream = Arc::new(dlhd_upstream(false));

    let err = service(&upstream, &[])
        .resolve("https://dlhd.dad/schedule")
        .await
        .unwrap_err();

    assert!(matches!(err, DlhdError::ChannelIdNotFound(_)));
    assert!(err.to_string().starts_with("channel id not found"));
}

#[tokio::test]
async fn test_page_without_players_fails() {
    let upstream = Arc::new(dlhd_upstream(false).route(CHANNEL_PAGE, "<html><body></body></html>"));

    let err = service(&upstream, &[])
        .resolve(CHANNEL_PAGE)
        .await
        .unwrap_err();

    assert!(matches!(err, DlhdError::NoPlayerLinks(_)));
}

#[tokio::test]
async fn test_no_iframe_loads() {
    let upstream = Arc::new(
        dlhd_upstream(true).route(
            PLAYER_TWO,
            format!(r#"<iframe src="{}"></iframe>"#, DEAD_IFRAME),
        ),
    );

    let err = service(&upstream, &[])
        .resolve(CHANNEL_PAGE)
        .await
        .unwrap_err();

    assert!(matches!(err, DlhdError::NoWorkingIframe(1)));
}

#[tokio::test]
async fn test_auth_failure_keeps_its_cause() {
    let upstream = Arc::new(
        dlhd_upstream(false).status(AUTH_ENDPOINT, StatusCode::INTERNAL_SERVER_ERROR),
    );

    let err = service(&upstream, &[])
        .resolve(CHANNEL_PAGE)
        .await
        .unwrap_err();

    assert!(matches!(err, DlhdError::AuthRequestFailed(_)));
    assert!(std::error::Error::source(&err).is_some());
    assert!(upstream.requests_to(LOOKUP_URL).is_empty());
}

#[tokio::test]
async fn test_blank_server_key_fails() {
    let upstream = Arc::new(dlhd_upstream(false).route(LOOKUP_URL, r#"{"server_key":"  "}"#));

    let err = service(&upstream, &[])
        .resolve(CHANNEL_PAGE)
        .await
        .unwrap_err();

    assert!(matches!(err, DlhdError::NoServerKey(_)));
}

#[tokio::test]
async fn test_unreachable_domains_fall_back_to_the_first_candidate() {
    let upstream = Arc::new(
        dlhd_upstream(false).status(SITE_BASE, StatusCode::INTERNAL_SERVER_ERROR),
    );

    let stream = service(&upstream, &[]).resolve(CHANNEL_PAGE).await.unwrap();

    assert_eq!(stream.manifest_url, MANIFEST_URL);
    // preferred domain first, then the remaining candidate
    assert_eq!(upstream.requests_to(SITE_BASE).len(), 1);
    assert_eq!(upstream.requests_to("https://daddylive.sx/").len(), 1);
}
