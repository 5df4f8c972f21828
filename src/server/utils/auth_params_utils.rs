// recovers the auth handshake fields out of the obfuscated player iframe
//
// the iframe stashes a base64 json blob in some SHOUTING_CASE const, and most of the values in
// that blob are base64'd a second time. they change the variable names every few weeks so this
// only looks at the shape of the data
use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// standard alphabet that doesn't care whether the padding made it through
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const PRIMARY_MIN_LEN: usize = 50;
const FALLBACK_MIN_LEN: usize = 30;

static PRIMARY_CANDIDATE: Lazy<Regex> = Lazy::new(|| candidate_regex(PRIMARY_MIN_LEN));
static FALLBACK_CANDIDATE: Lazy<Regex> = Lazy::new(|| candidate_regex(FALLBACK_MIN_LEN));

static LOOKS_LIKE_BASE64: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9+/]+=*$").expect("valid base64 shape regex"));

fn candidate_regex(min_len: usize) -> Regex {
    Regex::new(&format!(
        r#"(?:const|var|let)\s+[A-Za-z0-9_$]+\s*=\s*["']([A-Za-z0-9+/=]{{{min_len},}})["']"#
    ))
    .expect("valid candidate regex")
}

fn field_regex(aliases: &str) -> Regex {
    Regex::new(&format!(
        r#"["']?(?:{aliases})["']?\s*:\s*["']([^"']+)["']"#
    ))
    .expect("valid field regex")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthField {
    Host,
    ScriptPath,
    Timestamp,
    Nonce,
    Signature,
}

impl AuthField {
    pub const ALL: [AuthField; 5] = [
        AuthField::Host,
        AuthField::ScriptPath,
        AuthField::Timestamp,
        AuthField::Nonce,
        AuthField::Signature,
    ];

    /// name used when reporting what's missing
    pub fn name(self) -> &'static str {
        match self {
            Self::Host => "auth_host",
            Self::ScriptPath => "auth_php",
            Self::Timestamp => "auth_ts",
            Self::Nonce => "auth_rnd",
            Self::Signature => "auth_sig",
        }
    }

    /// record keys, long form first
    fn aliases(self) -> [&'static str; 2] {
        match self {
            Self::Host => ["b_host", "host"],
            Self::ScriptPath => ["b_script", "script"],
            Self::Timestamp => ["b_ts", "ts"],
            Self::Nonce => ["b_rnd", "rnd"],
            Self::Signature => ["b_sig", "sig"],
        }
    }

    fn pattern(self) -> &'static Regex {
        static HOST: Lazy<Regex> = Lazy::new(|| field_regex("b_host|host"));
        static SCRIPT: Lazy<Regex> = Lazy::new(|| field_regex("b_script|script"));
        static TS: Lazy<Regex> = Lazy::new(|| field_regex("b_ts|ts"));
        static RND: Lazy<Regex> = Lazy::new(|| field_regex("b_rnd|rnd"));
        static SIG: Lazy<Regex> = Lazy::new(|| field_regex("b_sig|sig"));

        match self {
            Self::Host => &HOST,
            Self::ScriptPath => &SCRIPT,
            Self::Timestamp => &TS,
            Self::Nonce => &RND,
            Self::Signature => &SIG,
        }
    }
}

/// whatever could be recovered, validation is up to the caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthParameters {
    pub host: Option<String>,
    pub script_path: Option<String>,
    pub timestamp: Option<String>,
    pub nonce: Option<String>,
    pub signature: Option<String>,
}

impl AuthParameters {
    pub fn get(&self, field: AuthField) -> Option<&str> {
        match field {
            AuthField::Host => self.host.as_deref(),
            AuthField::ScriptPath => self.script_path.as_deref(),
            AuthField::Timestamp => self.timestamp.as_deref(),
            AuthField::Nonce => self.nonce.as_deref(),
            AuthField::Signature => self.signature.as_deref(),
        }
    }

    fn slot(&mut self, field: AuthField) -> &mut Option<String> {
        match field {
            AuthField::Host => &mut self.host,
            AuthField::ScriptPath => &mut self.script_path,
            AuthField::Timestamp => &mut self.timestamp,
            AuthField::Nonce => &mut self.nonce,
            AuthField::Signature => &mut self.signature,
        }
    }

    /// first value wins, later candidates only fill holes
    fn fill(&mut self, field: AuthField, value: String) {
        let slot = self.slot(field);
        if slot.is_none() && !value.is_empty() {
            *slot = Some(value);
        }
    }

    pub fn missing(&self) -> Vec<&'static str> {
        AuthField::ALL
            .into_iter()
            .filter(|f| self.get(*f).is_none())
            .map(AuthField::name)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        AuthField::ALL.into_iter().all(|f| self.get(f).is_some())
    }
}

/// pulls the five auth fields out of arbitrary script text
pub fn extract_auth_params(script: &str) -> AuthParameters {
    let mut params = AuthParameters::default();

    for candidates in [&*PRIMARY_CANDIDATE, &*FALLBACK_CANDIDATE] {
        for caps in candidates.captures_iter(script) {
            let Some(encoded) = caps.get(1) else {
                continue;
            };
            let Some(decoded) = decode_text(encoded.as_str()) else {
                continue;
            };

            read_record(&decoded, &mut params);
            if params.is_complete() {
                return params;
            }

            read_patterns(&decoded, &mut params);
            if params.is_complete() {
                return params;
            }
        }
    }

    params
}

fn read_record(decoded: &str, params: &mut AuthParameters) {
    let Ok(Value::Object(record)) = serde_json::from_str::<Value>(decoded) else {
        return;
    };

    for field in AuthField::ALL {
        let value = field.aliases().iter().find_map(|key| match record.get(*key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        });

        if let Some(value) = value {
            params.fill(field, decode_if_base64(&value));
        }
    }
}

fn read_patterns(decoded: &str, params: &mut AuthParameters) {
    for field in AuthField::ALL {
        if let Some(caps) = field.pattern().captures(decoded) {
            params.fill(field, caps[1].to_string());
        }
    }
}

fn decode_text(encoded: &str) -> Option<String> {
    let bytes = LENIENT_BASE64.decode(encoded.trim_end_matches('=')).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// second layer of encoding, only taken if the result is clean printable utf-8
pub fn decode_if_base64(value: &str) -> String {
    if !LOOKS_LIKE_BASE64.is_match(value) {
        return value.to_string();
    }

    let Ok(bytes) = LENIENT_BASE64.decode(value.trim_end_matches('=')) else {
        return value.to_string();
    };

    match String::from_utf8(bytes) {
        Ok(text) if !text.is_empty() && text.chars().all(is_printable) => text,
        _ => value.to_string(),
    }
}

fn is_printable(c: char) -> bool {
    !matches!(c as u32, 0x00..=0x08 | 0x0E..=0x1F | 0x7F..=0x9F)
}
