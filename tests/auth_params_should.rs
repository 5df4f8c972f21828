use base64::{Engine as _, engine::general_purpose::STANDARD};

use dlhd_edge::server::utils::auth_params_utils::{decode_if_base64, extract_auth_params};

mod common;

#[test]
fn test_double_encoded_record_is_fully_decoded() {
    let script = format!(r#"const ZKXQ = "{}";"#, common::auth_blob(true));

    let params = extract_auth_params(&script);

    assert!(params.is_complete());
    assert_eq!(params.host.as_deref(), Some("https://auth.example/"));
    assert_eq!(params.script_path.as_deref(), Some("a.php"));
    assert_eq!(params.timestamp.as_deref(), Some("1700000000"));
    assert_eq!(params.nonce.as_deref(), Some("abc123"));
    assert_eq!(params.signature.as_deref(), Some("deadbeefsig"));
}

#[test]
fn test_short_aliases_and_numeric_values() {
    let record = r#"{"host":"https://h.example/","script":"/auth.php","ts":1700000000,"rnd":"r4nd0m","sig":"s1gnature"}"#;
    let script = format!(r#"var blob = '{}';"#, STANDARD.encode(record));

    let params = extract_auth_params(&script);

    assert_eq!(params.timestamp.as_deref(), Some("1700000000"));
    assert_eq!(params.script_path.as_deref(), Some("/auth.php"));
    assert!(params.is_complete());
}

#[test]
fn test_non_json_payload_falls_back_to_patterns() {
    let text = r#"b_host: "https://p.example/", b_script: 'a.php', b_ts: "1", b_rnd: "2", b_sig: "3""#;
    let script = format!(r#"let X = "{}";"#, STANDARD.encode(text));

    let params = extract_auth_params(&script);

    assert!(params.is_complete());
    assert_eq!(params.host.as_deref(), Some("https://p.example/"));
    assert_eq!(params.signature.as_deref(), Some("3"));
}

#[test]
fn test_fields_accumulate_across_candidates() {
    let first = STANDARD.encode(r#"{"b_host":"https://one.example/","b_script":"a.php","padding":"xxxxxxxx"}"#);
    let second = STANDARD.encode(r#"{"b_host":"https://two.example/","b_ts":"10","b_rnd":"20","b_sig":"30"}"#);
    let script = format!(r#"const A = "{first}"; const B = "{second}";"#);

    let params = extract_auth_params(&script);

    assert!(params.is_complete());
    // first value wins
    assert_eq!(params.host.as_deref(), Some("https://one.example/"));
    assert_eq!(params.nonce.as_deref(), Some("20"));
}

#[test]
fn test_short_candidates_use_the_fallback_threshold() {
    // 40ish chars of base64, below the primary threshold
    let record = r#"{"host":"h","script":"s","ts":"1"}"#;
    let encoded = STANDARD.encode(record);
    assert!(encoded.len() >= 30 && encoded.len() < 50);

    let params = extract_auth_params(&format!(r#"const S = "{encoded}";"#));

    assert_eq!(params.host.as_deref(), Some("h"));
    assert_eq!(params.missing(), vec!["auth_rnd", "auth_sig"]);
}

#[test]
fn test_missing_fields_are_all_named() {
    let params = extract_auth_params("nothing to see here");

    assert_eq!(
        params.missing(),
        vec!["auth_host", "auth_php", "auth_ts", "auth_rnd", "auth_sig"]
    );
    assert!(!params.is_complete());
}

#[test]
fn test_decode_if_base64_only_takes_printable_text() {
    assert_eq!(decode_if_base64(&STANDARD.encode("hello world")), "hello world");
    // not base64 shaped
    assert_eq!(decode_if_base64("https://x.example/"), "https://x.example/");
    // decodes to control bytes
    let binary = STANDARD.encode([0x01u8, 0x02, 0x03]);
    assert_eq!(decode_if_base64(&binary), binary);
}
