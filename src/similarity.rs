use crate::config::SimilarityConfig;
use crate::error::AppError;
use crate::metadata::ImageId;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Number, Value};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityCandidate {
    pub image_id: ImageId,
    /// Provider-assigned rank, kept exactly as returned.
    pub rank: Number,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<Number>,
    /// In the provider's relevance order.
    pub recommendations: Vec<SimilarityCandidate>,
}

impl SimilarityResponse {
    pub fn candidate_ids(&self) -> Vec<ImageId> {
        self.recommendations.iter().map(|c| c.image_id).collect()
    }
}

#[async_trait]
pub trait SimilarityProvider: Send + Sync {
    async fn similarity_search(&self, text: &str) -> Result<SimilarityResponse, AppError>;
}

fn parse_candidate(value: &Value) -> Option<SimilarityCandidate> {
    let image_id = value.get("image_id")?.as_i64()?;
    let rank = match value.get("rank")? {
        Value::Number(n) => n.clone(),
        _ => return None,
    };
    Some(SimilarityCandidate { image_id, rank })
}

/// Accepts the payload only if every candidate is well formed; nothing is
/// partially accepted.
pub fn parse_response(payload: &Value) -> Option<SimilarityResponse> {
    let count = match payload.get("count") {
        None => None,
        Some(Value::Number(n)) => Some(n.clone()),
        Some(_) => return None,
    };
    let recommendations = payload
        .get("recommendations")?
        .as_array()?
        .iter()
        .map(parse_candidate)
        .collect::<Option<Vec<_>>>()?;
    Some(SimilarityResponse {
        count,
        recommendations,
    })
}

pub struct HttpSimilarityClient {
    client: reqwest::Client,
    endpoint: Url,
    candidate_count: u32,
}

impl HttpSimilarityClient {
    pub fn new(config: &SimilarityConfig) -> Result<Self, AppError> {
        log::debug!("Creating similarity client for endpoint: {}", config.endpoint);
        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            AppError::Config(config::ConfigError::Message(format!(
                "invalid similarity endpoint '{}': {}",
                config.endpoint, e
            )))
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Config(config::ConfigError::Message(e.to_string())))?;
        Ok(Self {
            client,
            endpoint,
            candidate_count: config.candidate_count,
        })
    }

    fn unavailable(&self, text: &str, err: reqwest::Error) -> AppError {
        log::warn!("Similarity request for '{}' to {} failed: {}", text, self.endpoint, err);
        // The cause text goes back to the caller; the internal endpoint does not.
        AppError::ProviderUnavailable(err.without_url().to_string())
    }
}

#[async_trait]
impl SimilarityProvider for HttpSimilarityClient {
    async fn similarity_search(&self, text: &str) -> Result<SimilarityResponse, AppError> {
        // The count hint is fixed; it is not derived from the requested page size.
        let body = json!({ "text": text, "count": self.candidate_count });
        log::trace!("Similarity request body: {}", body);

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| self.unavailable(text, e))?;

        let raw = response.text().await.map_err(|e| self.unavailable(text, e))?;
        let payload: Value = match serde_json::from_str(&raw) {
            Ok(payload) => payload,
            Err(e) => {
                log::warn!("Similarity provider returned a non-JSON body ({}): {}", e, raw);
                return Err(AppError::InvalidProviderResponse);
            }
        };

        match parse_response(&payload) {
            Some(parsed) => {
                log::debug!(
                    "Similarity provider returned {} candidates for '{}'",
                    parsed.recommendations.len(),
                    text
                );
                Ok(parsed)
            }
            None => {
                log::warn!("Invalid similarity response: {}", payload);
                Err(AppError::InvalidProviderResponse)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client_for(endpoint: String) -> HttpSimilarityClient {
        HttpSimilarityClient::new(&SimilarityConfig {
            endpoint,
            timeout_secs: 5,
            candidate_count: 10,
        })
        .unwrap()
    }

    #[test]
    fn parse_keeps_order_and_rank_as_returned() {
        let parsed = parse_response(&json!({
            "count": 3,
            "recommendations": [
                {"image_id": 9, "rank": 1},
                {"image_id": 2, "rank": 0.75},
                {"image_id": 5, "rank": 3}
            ]
        }))
        .unwrap();
        assert_eq!(parsed.candidate_ids(), vec![9, 2, 5]);
        assert_eq!(parsed.recommendations[1].rank.as_f64(), Some(0.75));
        assert_eq!(parsed.count.and_then(|c| c.as_u64()), Some(3));
    }

    #[test]
    fn parse_allows_missing_count() {
        let parsed = parse_response(&json!({"recommendations": []})).unwrap();
        assert!(parsed.count.is_none());
        assert!(parsed.recommendations.is_empty());
    }

    #[test]
    fn parse_rejects_malformed_payloads() {
        let bad = [
            json!({}),
            json!({"recommendations": "nope"}),
            json!({"count": "2", "recommendations": []}),
            json!({"count": null, "recommendations": []}),
            json!({"recommendations": [{"image_id": 1, "rank": 1}, {"image_id": "2", "rank": 2}]}),
            json!({"recommendations": [{"image_id": 1}]}),
            json!({"recommendations": [{"image_id": 1, "rank": "first"}]}),
            json!({"recommendations": [{"rank": 1}]}),
        ];
        for payload in bad {
            assert!(parse_response(&payload).is_none(), "accepted {}", payload);
        }
    }

    #[test]
    fn rejects_unparseable_endpoint() {
        let result = HttpSimilarityClient::new(&SimilarityConfig {
            endpoint: "not a url".into(),
            timeout_secs: 1,
            candidate_count: 10,
        });
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn sends_text_with_fixed_count_hint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/ai/similar")
            .match_body(Matcher::Json(json!({"text": "cat", "count": 10})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"count": 2, "recommendations": [{"image_id": 5, "rank": 1}, {"image_id": 2, "rank": 2}]})
                    .to_string(),
            )
            .create_async()
            .await;

        let client = client_for(format!("{}/ai/similar", server.url()));
        let response = client.similarity_search("cat").await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.candidate_ids(), vec![5, 2]);
    }

    #[tokio::test]
    async fn malformed_body_is_invalid_provider_response() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/ai/similar")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"recommendations": [{"image_id": 5}]}).to_string())
            .create_async()
            .await;

        let client = client_for(format!("{}/ai/similar", server.url()));
        let err = client.similarity_search("cat").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidProviderResponse));
    }

    #[tokio::test]
    async fn non_json_body_is_invalid_provider_response() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/ai/similar")
            .with_status(200)
            .with_body("<html>oops</html>")
            .create_async()
            .await;

        let client = client_for(format!("{}/ai/similar", server.url()));
        let err = client.similarity_search("cat").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidProviderResponse));
    }

    #[tokio::test]
    async fn server_error_is_provider_unavailable() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/ai/similar")
            .with_status(503)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(format!("{}/ai/similar", server.url()));
        let err = client.similarity_search("cat").await.unwrap_err();

        // A single attempt, no retry.
        mock.assert_async().await;
        match err {
            AppError::ProviderUnavailable(cause) => assert!(cause.contains("503")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn slow_provider_fails_at_the_timeout() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/ai/similar")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body_from_request(|_| {
                std::thread::sleep(Duration::from_secs(3));
                json!({"recommendations": []}).to_string().into_bytes()
            })
            .create_async()
            .await;

        let client = HttpSimilarityClient::new(&SimilarityConfig {
            endpoint: format!("{}/ai/similar", server.url()),
            timeout_secs: 1,
            candidate_count: 10,
        })
        .unwrap();

        let started = std::time::Instant::now();
        let err = client.similarity_search("cat").await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, AppError::ProviderUnavailable(_)), "got {:?}", err);
        assert!(elapsed >= Duration::from_millis(900), "returned after {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(2500), "returned after {:?}", elapsed);
    }

    #[tokio::test]
    async fn unavailable_cause_omits_provider_url() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/ai/similar")
            .with_status(500)
            .create_async()
            .await;

        let client = client_for(format!("{}/ai/similar", server.url()));
        match client.similarity_search("cat").await.unwrap_err() {
            AppError::ProviderUnavailable(cause) => {
                assert!(cause.contains("500"), "cause: {}", cause);
                assert!(!cause.contains(&server.host_with_port()), "cause: {}", cause);
                assert!(!cause.contains("/ai/similar"), "cause: {}", cause);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn connection_refused_is_provider_unavailable() {
        let client = client_for("http://127.0.0.1:9/ai/similar".into());
        let err = client.similarity_search("cat").await.unwrap_err();
        assert!(matches!(err, AppError::ProviderUnavailable(_)));
    }
}
