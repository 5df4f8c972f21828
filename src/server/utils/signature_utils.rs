use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

/// how long a rewritten key url stays valid, a manifest is re-requested way before this
pub const KEY_URL_TTL_HOURS: i64 = 12;

/// signs the key urls written into manifests so the key route can't be used as an open proxy
pub struct KeyUrlSigner {
    secret: String,
}

impl KeyUrlSigner {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }

    /// sig is hmac(secret, upstream key url + expiry), hex encoded
    pub fn sign(&self, key_url: &str, expiry: i64) -> String {
        // hmac accepts any key length, new_from_slice can't fail here
        let mut mac = match HmacSha256::new_from_slice(self.secret.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => return String::new(),
        };

        mac.update(key_url.as_bytes());
        mac.update(expiry.to_string().as_bytes());

        hex::encode(mac.finalize().into_bytes())
    }

    pub fn verify(&self, key_url: &str, expiry: i64, signature: &str) -> bool {
        if now() > expiry {
            return false;
        }

        let expected = self.sign(key_url, expiry);

        // constant time compare
        signature.len() == expected.len()
            && signature
                .as_bytes()
                .iter()
                .zip(expected.as_bytes().iter())
                .fold(0, |acc, (a, b)| acc | (a ^ b))
                == 0
    }

    pub fn expiry_from_now(hours: i64) -> i64 {
        now() + hours * 3600
    }
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
