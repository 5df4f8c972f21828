// tiny line oriented parser for the one line we care about in a dlhd manifest:
//
//   #EXT-X-KEY:METHOD=AES-128,URI="https://...",IV=0x...,KEYFORMAT="identity"
//
// only URI ever changes, every other attribute keeps its exact bytes
const KEY_TAG: &str = "#EXT-X-KEY:";
const DEFAULT_KEY_FORMAT: &str = "identity";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Attribute {
    name: String,
    /// the whole `NAME=value` token as it appeared
    raw: String,
}

impl Attribute {
    fn parse(raw: &str) -> Self {
        let name = raw
            .split_once('=')
            .map(|(name, _)| name)
            .unwrap_or(raw)
            .trim()
            .to_ascii_uppercase();

        Self {
            name,
            raw: raw.to_string(),
        }
    }

    fn value(&self) -> &str {
        self.raw.split_once('=').map(|(_, v)| v.trim()).unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLine {
    attributes: Vec<Attribute>,
}

impl KeyLine {
    /// `None` for anything that isn't an AES-128 key tag with a quoted URI
    pub fn parse(line: &str) -> Option<Self> {
        let body = line.strip_prefix(KEY_TAG)?;
        let attributes: Vec<Attribute> = split_attributes(body)
            .into_iter()
            .map(Attribute::parse)
            .collect();

        let key = Self { attributes };
        if key.attribute("METHOD")?.value() != "AES-128" {
            return None;
        }

        let uri = key.attribute("URI")?.value();
        if uri.len() < 2 || !uri.starts_with('"') || !uri.ends_with('"') {
            return None;
        }

        Some(key)
    }

    fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn uri(&self) -> &str {
        self.attribute("URI")
            .map(|a| a.value().trim_matches('"'))
            .unwrap_or("")
    }

    /// IV exactly as written, `0x...` usually
    pub fn iv(&self) -> Option<&str> {
        self.attribute("IV").map(Attribute::value)
    }

    pub fn key_format(&self) -> Option<&str> {
        self.attribute("KEYFORMAT").map(|a| a.value().trim_matches('"'))
    }

    /// same line pointing somewhere else, KEYFORMAT gets the identity default if it was missing
    pub fn with_uri(&self, uri: &str) -> Self {
        let mut attributes: Vec<Attribute> = self
            .attributes
            .iter()
            .map(|a| {
                if a.name == "URI" {
                    Attribute::parse(&format!("URI=\"{}\"", uri))
                } else {
                    a.clone()
                }
            })
            .collect();

        if self.attribute("KEYFORMAT").is_none() {
            attributes.push(Attribute::parse(&format!(
                "KEYFORMAT=\"{}\"",
                DEFAULT_KEY_FORMAT
            )));
        }

        Self { attributes }
    }

    pub fn render(&self) -> String {
        let body: Vec<&str> = self.attributes.iter().map(|a| a.raw.as_str()).collect();
        format!("{}{}", KEY_TAG, body.join(","))
    }
}

// commas inside quoted values don't split
fn split_attributes(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;

    for (i, c) in body.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[start..]);

    parts.into_iter().filter(|p| !p.trim().is_empty()).collect()
}

/// splits off `\n` / `\r\n` so rewritten lines keep their original terminator
fn split_terminator(segment: &str) -> (&str, &str) {
    if let Some(content) = segment.strip_suffix("\r\n") {
        (content, "\r\n")
    } else if let Some(content) = segment.strip_suffix('\n') {
        (content, "\n")
    } else {
        (segment, "")
    }
}

pub fn find_key_line(manifest: &str) -> Option<KeyLine> {
    manifest
        .split_inclusive('\n')
        .find_map(|segment| KeyLine::parse(split_terminator(segment).0))
}

pub fn count_key_lines(manifest: &str) -> usize {
    manifest
        .split_inclusive('\n')
        .filter(|segment| KeyLine::parse(split_terminator(segment).0).is_some())
        .count()
}

/// rewrites the URI of the first key line with whatever `proxied_uri` returns for it
///
/// `None` means there was no key line (unencrypted channel), the caller keeps the original
pub fn rewrite_key_uri<F>(manifest: &str, proxied_uri: F) -> Option<String>
where
    F: FnOnce(&KeyLine) -> String,
{
    let mut proxied_uri = Some(proxied_uri);
    let mut out = String::with_capacity(manifest.len() + 256);

    for segment in manifest.split_inclusive('\n') {
        let (content, terminator) = split_terminator(segment);

        if let Some(key) = proxied_uri.is_some().then(|| KeyLine::parse(content)).flatten() {
            if let Some(f) = proxied_uri.take() {
                out.push_str(&key.with_uri(&f(&key)).render());
                out.push_str(terminator);
                continue;
            }
        }

        out.push_str(segment);
    }

    // still holding the closure means nothing got rewritten
    match proxied_uri {
        Some(_) => None,
        None => Some(out),
    }
}
