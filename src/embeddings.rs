//! The embedding service boundary (spec.md §6, §9): the engine never
//! depends on a concrete network or model at compile time, matching the
//! teacher's trait-light but interface-conscious style
//! (`extractors/manager.rs` dispatches over a trait object rather than a
//! concrete extractor). Embedding model internals are explicitly out of
//! scope (spec.md §1); only this boundary is modeled.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingRequest {
    pub texts: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingResult {
    pub vector: Vec<f32>,
    /// Empty string means "no model reported" — spec.md §4.7 step 6 and §6
    /// treat a non-empty vector with an empty model name as a hard error
    /// for that one chunk.
    pub model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingResponse {
    pub results: Vec<EmbeddingResult>,
}

#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, request: EmbeddingRequest) -> anyhow::Result<EmbeddingResponse>;
}

/// HTTP client for an external embedding service, the one concrete
/// implementation this crate ships.
pub struct HttpEmbeddingService {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpEmbeddingService {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl EmbeddingService for HttpEmbeddingService {
    async fn embed(&self, request: EmbeddingRequest) -> anyhow::Result<EmbeddingResponse> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json::<EmbeddingResponse>()
            .await?;
        Ok(response)
    }
}

/// Validate one embedding result against spec.md §6/§4.7's rule: a
/// non-empty vector with an empty model name is rejected outright.
pub fn validate_result(result: &EmbeddingResult) -> Result<(), &'static str> {
    if !result.vector.is_empty() && result.model.is_empty() {
        return Err("non-empty vector with empty model name");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticService(Vec<EmbeddingResult>);

    #[async_trait]
    impl EmbeddingService for StaticService {
        async fn embed(&self, _request: EmbeddingRequest) -> anyhow::Result<EmbeddingResponse> {
            Ok(EmbeddingResponse {
                results: self.0.clone(),
            })
        }
    }

    #[tokio::test]
    async fn trait_object_can_be_used_polymorphically() {
        let service: Box<dyn EmbeddingService> = Box::new(StaticService(vec![EmbeddingResult {
            vector: vec![0.1, 0.2],
            model: "test-model".into(),
        }]));
        let response = service
            .embed(EmbeddingRequest {
                texts: vec!["hello".into()],
            })
            .await
            .unwrap();
        assert_eq!(response.results.len(), 1);
    }

    #[test]
    fn empty_model_with_nonempty_vector_is_rejected() {
        let result = EmbeddingResult {
            vector: vec![0.1],
            model: String::new(),
        };
        assert!(validate_result(&result).is_err());
    }

    #[test]
    fn empty_vector_and_empty_model_is_a_legitimate_skip() {
        let result = EmbeddingResult {
            vector: vec![],
            model: String::new(),
        };
        assert!(validate_result(&result).is_ok());
    }
}
