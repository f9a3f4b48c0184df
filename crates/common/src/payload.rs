// Taiga "now watching" payload: wire shape, percent-decoding, canonical record.
//
// Taiga sends every text field percent-encoded. The wire form is parsed as-is
// and then consumed by `RawUpdate::decoded`, which produces the canonical
// `UpdateRecord` used everywhere else.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("malformed update payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("field `{field}` is not valid percent-encoded UTF-8")]
    Decode { field: &'static str },
}

/// Update body exactly as Taiga posts it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawUpdate {
    pub title: String,
    pub url: String,
    pub image: String,
    pub total_eps: u32,
    pub watched_eps: u32,
    pub rewatching: bool,
    pub current_ep: RawEpisode,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawEpisode {
    pub id: i64,
    pub title: String,
}

/// Decoded update, serialized under the names templates refer to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateRecord {
    pub title: String,
    pub url: String,
    pub image_url: String,
    pub total_eps: u32,
    pub watched_eps: u32,
    pub rewatching: bool,
    pub current_episode: Episode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Episode {
    pub title: String,
    pub number: i64,
}

impl RawUpdate {
    /// Percent-decode every text field, leaving numbers and flags untouched.
    pub fn decoded(self) -> Result<UpdateRecord, PayloadError> {
        Ok(UpdateRecord {
            title: unescape("title", &self.title)?,
            url: unescape("url", &self.url)?,
            image_url: unescape("image", &self.image)?,
            total_eps: self.total_eps,
            watched_eps: self.watched_eps,
            rewatching: self.rewatching,
            current_episode: Episode {
                title: unescape("current_ep.title", &self.current_ep.title)?,
                number: self.current_ep.id,
            },
        })
    }
}

/// Parse a request body and decode it into an [`UpdateRecord`].
pub fn decode_payload(body: &[u8]) -> Result<UpdateRecord, PayloadError> {
    let raw: RawUpdate = serde_json::from_slice(body)?;
    raw.decoded()
}

// `+` stays a literal plus and malformed escapes pass through unchanged.
fn unescape(field: &'static str, value: &str) -> Result<String, PayloadError> {
    urlencoding::decode(value)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| PayloadError::Decode { field })
}
