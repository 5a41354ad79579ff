// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Marketing artwork generation.
//!
//! A thin client for a generative-image HTTP API: one prompt in, one
//! base64-encoded image out. Entirely independent of the audio core; only
//! the artwork subcommand touches it.

use base64::prelude::{Engine, BASE64_STANDARD};
use serde::Deserialize;
use tracing::info;

/// The default image generation endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/images/generations";

/// The environment variable holding the API key.
pub const API_KEY_ENV: &str = "STRUMMER_IMAGE_API_KEY";

/// Errors produced while generating artwork.
#[derive(Debug, thiserror::Error)]
pub enum ArtworkError {
    #[error("artwork request failed: {0}")]
    Request(String),

    #[error("artwork API returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("artwork payload error: {0}")]
    Payload(String),
}

/// The response payload: a list of generated images.
#[derive(Deserialize)]
struct GenerationResponse {
    data: Vec<GeneratedImage>,
}

#[derive(Deserialize)]
struct GeneratedImage {
    b64_json: String,
}

/// A client for the image generation API.
pub struct ArtworkClient {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
}

impl ArtworkClient {
    /// Creates a client for the given endpoint.
    pub fn new(endpoint: &str, api_key: &str) -> ArtworkClient {
        ArtworkClient {
            client: reqwest::blocking::Client::new(),
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Generates one image for the prompt and returns its decoded bytes.
    pub fn generate(&self, prompt: &str) -> Result<Vec<u8>, ArtworkError> {
        info!(prompt, "Requesting artwork.");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "prompt": prompt,
                "n": 1,
                "size": "1024x1024",
                "response_format": "b64_json",
            }))
            .send()
            .map_err(|e| ArtworkError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ArtworkError::Status(status));
        }

        let body = response
            .bytes()
            .map_err(|e| ArtworkError::Request(e.to_string()))?;
        decode_response(&body)
    }
}

/// Decodes the API response body into image bytes.
fn decode_response(body: &[u8]) -> Result<Vec<u8>, ArtworkError> {
    let response: GenerationResponse =
        serde_json::from_slice(body).map_err(|e| ArtworkError::Payload(e.to_string()))?;

    let image = response
        .data
        .first()
        .ok_or_else(|| ArtworkError::Payload("no images in response".to_string()))?;

    BASE64_STANDARD
        .decode(&image.b64_json)
        .map_err(|e| ArtworkError::Payload(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_response() {
        let body = format!(
            r#"{{"created": 1700000000, "data": [{{"b64_json": "{}"}}]}}"#,
            BASE64_STANDARD.encode(b"not-really-a-png")
        );

        let bytes = decode_response(body.as_bytes()).unwrap();
        assert_eq!(bytes, b"not-really-a-png");
    }

    #[test]
    fn test_empty_response_is_payload_error() {
        let result = decode_response(br#"{"data": []}"#);
        assert!(matches!(result, Err(ArtworkError::Payload(_))));
    }

    #[test]
    fn test_malformed_json_is_payload_error() {
        let result = decode_response(b"<html>nope</html>");
        assert!(matches!(result, Err(ArtworkError::Payload(_))));
    }

    #[test]
    fn test_invalid_base64_is_payload_error() {
        let result = decode_response(br#"{"data": [{"b64_json": "@@@"}]}"#);
        assert!(matches!(result, Err(ArtworkError::Payload(_))));
    }
}
