// every pure bit of the dlhd handshake, kept out of the service so it can be tested offline
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use super::auth_params_utils::AuthParameters;

pub const DEFAULT_LOOKUP_PATH: &str = "/server_lookup.js?channel_id=";

// this one gets a dedicated url shape on their side for whatever reason
const LITERAL_SERVER_KEY: &str = "top1/cdn";

static CHANNEL_ID_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"/premium(\d+)/mono\.m3u8$",
        r"/(?:watch|stream|cast|player)/stream-(\d+)\.php",
        r"watch\.php\?id=(\d+)",
        r"(?i)(?:%2F|/)stream-(\d+)\.php",
        r"stream-(\d+)\.php",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid channel id regex"))
    .collect()
});

static CHANNEL_KEY_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r#"const\s+CHANNEL_KEY\s*=\s*["']([^"']+)["']"#,
        r#"var\s+CHANNEL_KEY\s*=\s*["']([^"']+)["']"#,
        r#"let\s+CHANNEL_KEY\s*=\s*["']([^"']+)["']"#,
        r#"channelKey\s*=\s*["']([^"']+)["']"#,
        r#"var\s+channelKey\s*=\s*["']([^"']+)["']"#,
        r#"(?:let|const)\s+channelKey\s*=\s*["']([^"']+)["']"#,
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid channel key regex"))
    .collect()
});

static PLAYER_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Player\s*\d+$").expect("valid player label regex"));

static QUOTED_LOOKUP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"['"]([^'"]*server_lookup[^'"]*)['"]"#).expect("valid lookup regex")
});

static MONO_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/[^/]+/mono\.m3u8$").expect("valid mono suffix regex"));

static PLAYER_BUTTON: Lazy<Selector> =
    Lazy::new(|| Selector::parse("button[data-url]").expect("valid player selector"));

static IFRAME: Lazy<Selector> =
    Lazy::new(|| Selector::parse("iframe[src]").expect("valid iframe selector"));

/// numeric channel id out of any of the url shapes the site has used
pub fn extract_channel_id(url: &str) -> Option<String> {
    CHANNEL_ID_PATTERNS
        .iter()
        .find_map(|re| re.captures(url).map(|c| c[1].to_string()))
}

pub fn extract_channel_key(iframe: &str) -> Option<String> {
    CHANNEL_KEY_PATTERNS
        .iter()
        .find_map(|re| re.captures(iframe).map(|c| c[1].to_string()))
}

/// data-url targets of every "Player N" button on the channel page
pub fn extract_player_links(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);

    document
        .select(&PLAYER_BUTTON)
        .filter(|button| PLAYER_LABEL.is_match(button.text().collect::<String>().trim()))
        .filter_map(|button| button.value().attr("data-url"))
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .collect()
}

pub fn extract_iframe_sources(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);

    document
        .select(&IFRAME)
        .filter_map(|iframe| iframe.value().attr("src"))
        .map(|src| src.trim().to_string())
        .filter(|src| !src.is_empty())
        .collect()
}

/// absolute urls pass through, anything else hangs off the resolved site base
pub fn absolutize(link: &str, base_url: &str) -> String {
    if link.starts_with("http://") || link.starts_with("https://") {
        return link.to_string();
    }
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        link.trim_start_matches('/')
    )
}

/// `scheme://host[:port]` of a url, no trailing slash
pub fn origin_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed.host_str()?;
    Some(parsed.origin().ascii_serialization())
}

/// the iframe normally calls the default lookup path, when it doesn't the first quoted
/// server_lookup string on a fetchWithRetry line is used
pub fn server_lookup_path(iframe: &str) -> String {
    if iframe.contains("fetchWithRetry('/server_lookup.js?channel_id='") {
        return DEFAULT_LOOKUP_PATH.to_string();
    }

    iframe
        .lines()
        .filter(|line| line.contains("server_lookup.") && line.contains("fetchWithRetry"))
        .find_map(|line| QUOTED_LOOKUP.captures(line).map(|c| c[1].to_string()))
        .unwrap_or_else(|| DEFAULT_LOOKUP_PATH.to_string())
}

/// `a.php` is shorthand for the real auth endpoint
pub fn normalize_script_path(script_path: &str) -> String {
    let trimmed = script_path.trim();
    if trimmed.trim_start_matches('/') == "a.php" {
        "/auth.php".to_string()
    } else {
        trimmed.to_string()
    }
}

/// bare hosts get https and everything gets a trailing slash so joins stay under it
pub fn normalize_host(host: &str) -> String {
    let host = host.trim();
    let mut host = if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    };
    if !host.ends_with('/') {
        host.push('/');
    }
    host
}

/// auth request url, `None` for a param set that isn't complete
pub fn build_auth_url(
    params: &AuthParameters,
    channel_key: &str,
) -> Option<Result<Url, url::ParseError>> {
    let host = normalize_host(params.host.as_deref()?);
    let script = normalize_script_path(params.script_path.as_deref()?);
    let (ts, rnd, sig) = (
        params.timestamp.as_deref()?,
        params.nonce.as_deref()?,
        params.signature.as_deref()?,
    );

    Some(
        Url::parse(&host)
            .and_then(|base| base.join(script.trim_start_matches('/')))
            .map(|mut url| {
                url.query_pairs_mut()
                    .append_pair("channel_id", channel_key)
                    .append_pair("ts", ts)
                    .append_pair("rnd", rnd)
                    .append_pair("sig", sig);
                url
            }),
    )
}

/// manifest url for a server key, see the three shapes below
pub fn build_manifest_url(server_key: &str, channel_key: &str, cdn_domain: &str) -> String {
    let server_key = server_key.trim();

    if server_key == LITERAL_SERVER_KEY {
        return format!("https://top1.{cdn_domain}/top1/cdn/{channel_key}/mono.m3u8");
    }

    if server_key.contains('/') {
        let path = server_key.trim_matches('/');
        let shard = path.split('/').next().unwrap_or(path);
        return format!("https://{shard}.{cdn_domain}/{path}/{channel_key}/mono.m3u8");
    }

    format!("https://{server_key}new.{cdn_domain}/{server_key}/{channel_key}/mono.m3u8")
}

/// placeholder key url, the real one (with the right number) only shows up in the manifest
pub fn build_key_url_template(manifest_url: &str, channel_key: &str) -> String {
    let base = MONO_SUFFIX.replace(manifest_url, "/wmsxx.php");
    format!("{}?test=true&name={}&number=1", base, channel_key)
}
