//! Decoding of the JSONP bodies returned by Metronome
//!
//! Every Metronome response is wrapped in a `_(` ... `);` callback, and the `retrieve` response
//! additionally uses unquoted ` raw:` and ` derivative:` object keys, so the body is not valid JSON
//! until it has been repaired.

use serde::de::DeserializeOwned;
use tracing::error;

/// Name of the JSONP callback requested from the backend
pub const CALLBACK: &str = "_";

const PREFIX: &str = "_(";
const SUFFIX: &str = ");";

/// Unquoted keys emitted by the backend, and their quoted replacements
const UNQUOTED_KEYS: [(&str, &str); 2] = [
    (" derivative:", " \"derivative\":"),
    (" raw:", " \"raw\":"),
];

#[derive(Debug, thiserror::Error)]
pub enum JsonpError {
    #[error("response body is not wrapped in a `_( ... );` callback")]
    MissingWrapper { body: String },

    #[error("invalid JSON inside JSONP response: {source}")]
    Json {
        #[source]
        source: serde_json::Error,
        body: String,
    },
}

impl JsonpError {
    /// The complete, unmodified response body that failed to decode
    pub fn body(&self) -> &str {
        match self {
            Self::MissingWrapper { body } | Self::Json { body, .. } => body,
        }
    }
}

/// Strip the JSONP callback from `body`, repair the unquoted keys and deserialize the result
pub fn load_jsonp<T: DeserializeOwned>(body: &str) -> Result<T, JsonpError> {
    let Some(inner) = body
        .trim_end()
        .strip_prefix(PREFIX)
        .and_then(|s| s.strip_suffix(SUFFIX))
    else {
        error!(%body, "response is not JSONP");
        return Err(JsonpError::MissingWrapper {
            body: body.to_string(),
        });
    };

    let repaired = UNQUOTED_KEYS
        .iter()
        .fold(inner.to_string(), |s, (from, to)| s.replace(from, to));

    serde_json::from_str(&repaired).map_err(|source| {
        error!(%body, error = %source, "invalid JSONP");
        JsonpError::Json {
            source,
            body: body.to_string(),
        }
    })
}
