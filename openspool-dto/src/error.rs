use serde::{Deserialize, Serialize};

/// The body Spoolman sends with a failed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonError {
    pub message: String,
}

impl JsonError {
    /// The server's message if the body is a JSON error, the raw body otherwise.
    pub fn message_from(body: &str) -> String {
        serde_json::from_str::<JsonError>(body)
            .map(|e| e.message)
            .unwrap_or_else(|_| body.to_string())
    }
}
