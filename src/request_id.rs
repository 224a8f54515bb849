/// Correlation ids for connect requests
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

const SUFFIX_LEN: usize = 11;

/// Opaque token pairing a page reply with the request that caused it.
/// Unique, not secret.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// `<millis>-<random>`, e.g. `1698508200000-3f9c0a1b2d4`
    pub fn generate(now_ms: f64) -> RequestId {
        let random = Uuid::new_v4().simple().to_string();
        RequestId(format!("{}-{}", now_ms.max(0.0) as u64, &random[..SUFFIX_LEN]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId(s.to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
