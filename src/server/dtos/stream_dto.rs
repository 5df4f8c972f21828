use serde::{Deserialize, Serialize};

/// the three headers the cdn wants on every manifest and key request for a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamHeaders {
    #[serde(rename = "User-Agent")]
    pub user_agent: String,
    #[serde(rename = "Referer")]
    pub referer: String,
    #[serde(rename = "Origin")]
    pub origin: String,
}

impl StreamHeaders {
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("User-Agent", self.user_agent.clone()),
            ("Referer", self.referer.clone()),
            ("Origin", self.origin.clone()),
        ]
    }
}

/// result of a resolve, the key url is only a template until the manifest is fetched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamInfo {
    pub manifest_url: String,
    pub key_url: String,
    pub headers: StreamHeaders,
}
