use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::AiConfig;

/// Substrings (lower-cased) marking an error as worth retrying.
const TRANSIENT_PATTERNS: &[&str] = &[
    "429",
    "rate limit",
    "too many requests",
    "overload",
    "503",
    "unavailable",
    "quota",
    "resource_exhausted",
    "resource exhausted",
];

#[derive(Debug, Error)]
pub enum AiError {
    #[error("generative api returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("generative api request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("generative api returned no text")]
    EmptyResponse,
}

impl AiError {
    pub fn is_transient(&self) -> bool {
        let msg = self.to_string().to_lowercase();
        TRANSIENT_PATTERNS.iter().any(|p| msg.contains(p))
    }
}

/// Image bytes inlined into a prompt, already base64-encoded.
#[derive(Debug, Clone)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate(&self, prompt: &str, image: Option<&InlineImage>) -> Result<String, AiError>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text {
        text: &'a str,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    status: Option<String>,
    message: String,
}

/// Google Generative Language `generateContent` client.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(cfg: &AiConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.request_timeout())
            .build()?;
        Ok(Self {
            http,
            endpoint: cfg.endpoint.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            api_key: cfg.api_key.clone(),
        })
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn generate(&self, prompt: &str, image: Option<&InlineImage>) -> Result<String, AiError> {
        let mut parts = vec![Part::Text { text: prompt }];
        if let Some(img) = image {
            parts.push(Part::Inline {
                inline_data: InlineData {
                    mime_type: &img.mime_type,
                    data: &img.data,
                },
            });
        }
        let body = GenerateRequest {
            contents: vec![Content { parts }],
        };

        let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);
        let resp = self
            .http
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let raw = resp.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ErrorEnvelope>(&raw) {
                Ok(env) => match env.error.status {
                    Some(s) => format!("{}: {}", s, env.error.message),
                    None => env.error.message,
                },
                Err(_) => raw,
            };
            return Err(AiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateResponse = resp.json().await?;
        let text: String = parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .collect();
        if text.trim().is_empty() {
            return Err(AiError::EmptyResponse);
        }
        debug!(model = %self.model, chars = text.len(), "generation complete");
        Ok(text)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn config(endpoint: String) -> AiConfig {
        AiConfig {
            api_key: "test-key".into(),
            model: "test-model".into(),
            endpoint,
            max_attempts: 5,
            base_delay_ms: 1,
            max_delay_ms: 1,
            request_timeout_secs: 5,
        }
    }

    #[test]
    fn transient_classification() {
        let rate = AiError::Api {
            status: 429,
            message: "RESOURCE_EXHAUSTED: Resource has been exhausted".into(),
        };
        let overloaded = AiError::Api {
            status: 500,
            message: "The model is overloaded. Please try again later.".into(),
        };
        let bad_key = AiError::Api {
            status: 400,
            message: "INVALID_ARGUMENT: API key not valid".into(),
        };
        let denied = AiError::Api {
            status: 403,
            message: "PERMISSION_DENIED: caller does not have permission".into(),
        };
        assert!(rate.is_transient());
        assert!(overloaded.is_transient());
        assert!(!bad_key.is_transient());
        assert!(!denied.is_transient());
        assert!(!AiError::EmptyResponse.is_transient());
    }

    #[tokio::test]
    async fn sends_inline_image_and_joins_text_parts() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/models/test-model:generateContent")
                    .query_param("key", "test-key")
                    .body_contains("inlineData")
                    .body_contains("image/png");
                then.status(200).json_body(json!({
                    "candidates": [{
                        "content": { "parts": [
                            { "text": "ingredients: eggs, milk\n" },
                            { "text": "suggestions: omelette" }
                        ]}
                    }]
                }));
            })
            .await;

        let client = GeminiClient::new(&config(server.base_url())).unwrap();
        let image = InlineImage {
            mime_type: "image/png".into(),
            data: "aGVsbG8=".into(),
        };
        let text = client.generate("describe", Some(&image)).await.unwrap();
        assert_eq!(text, "ingredients: eggs, milk\nsuggestions: omelette");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn maps_error_envelope_to_api_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/models/test-model:generateContent");
                then.status(429).json_body(json!({
                    "error": { "code": 429, "status": "RESOURCE_EXHAUSTED", "message": "Quota exceeded" }
                }));
            })
            .await;

        let client = GeminiClient::new(&config(server.base_url())).unwrap();
        let err = client.generate("hi", None).await.unwrap_err();
        match &err {
            AiError::Api { status, message } => {
                assert_eq!(*status, 429);
                assert_eq!(message, "RESOURCE_EXHAUSTED: Quota exceeded");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn empty_candidates_are_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/models/test-model:generateContent");
                then.status(200).json_body(json!({ "candidates": [] }));
            })
            .await;

        let client = GeminiClient::new(&config(server.base_url())).unwrap();
        assert!(matches!(
            client.generate("hi", None).await,
            Err(AiError::EmptyResponse)
        ));
    }
}
