//! HTTP client for the external code classification service.
//!
//! Contract: `POST {endpoint}` with `{"code": "..."}`, answered by
//! `{"language": "...", "explanation": "..."}`. A language of `"unknown"` (or
//! none) means the snippet could not be classified.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

use crate::domain::{Classification, ClassifierError, CodeClassifier};

#[derive(Debug, Serialize)]
struct ClassifyRequest<'a> {
    code: &'a str,
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    #[serde(default)]
    language: String,
    #[serde(default)]
    explanation: Option<String>,
}

/// 外部 HTTP サービスを使った CodeClassifier 実装
#[derive(Debug, Clone)]
pub struct HttpCodeClassifier {
    client: Client,
    endpoint: Url,
}

impl HttpCodeClassifier {
    /// `timeout` bounds each request as a whole.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, ClassifierError> {
        let endpoint = Url::parse(endpoint).map_err(|err| ClassifierError::Request(err.to_string()))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ClassifierError::Request(err.to_string()))?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl CodeClassifier for HttpCodeClassifier {
    async fn classify(&self, code: &str) -> Result<Classification, ClassifierError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&ClassifyRequest { code })
            .send()
            .await
            .map_err(|err| ClassifierError::Request(err.to_string()))?
            .error_for_status()
            .map_err(|err| ClassifierError::Response(err.to_string()))?;
        let body: ClassifyResponse = response
            .json()
            .await
            .map_err(|err| ClassifierError::Response(err.to_string()))?;
        Ok(Classification::from_raw(&body.language, body.explanation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::StatusCode, routing::post};

    /// Serve `app` on an ephemeral port and return its base URL.
    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/classify", addr)
    }

    #[tokio::test]
    async fn test_classify_parses_service_answer() {
        // テスト項目: サービスの応答から言語と説明を取り出せる
        // given (前提条件):
        let app = Router::new().route(
            "/classify",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["code"], "fn main() {}");
                Json(serde_json::json!({"language": "rust", "explanation": "entry point"}))
            }),
        );
        let classifier = HttpCodeClassifier::new(&serve(app).await, Duration::from_secs(5)).unwrap();

        // when (操作):
        let result = classifier.classify("fn main() {}").await.unwrap();

        // then (期待する結果):
        assert_eq!(
            result,
            Classification::Known {
                language: "rust".to_string(),
                explanation: Some("entry point".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_classify_maps_unknown_sentinel() {
        // テスト項目: "unknown" の応答は Unknown になる
        // given (前提条件):
        let app = Router::new().route(
            "/classify",
            post(|| async { Json(serde_json::json!({"language": "unknown"})) }),
        );
        let classifier = HttpCodeClassifier::new(&serve(app).await, Duration::from_secs(5)).unwrap();

        // when (操作):
        let result = classifier.classify("???").await.unwrap();

        // then (期待する結果):
        assert_eq!(result, Classification::Unknown);
    }

    #[tokio::test]
    async fn test_classify_reports_error_status() {
        // テスト項目: エラーステータスは ClassifierError::Response として返される
        // given (前提条件):
        let app = Router::new().route(
            "/classify",
            post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let classifier = HttpCodeClassifier::new(&serve(app).await, Duration::from_secs(5)).unwrap();

        // when (操作):
        let result = classifier.classify("fn main() {}").await;

        // then (期待する結果):
        assert!(matches!(result, Err(ClassifierError::Response(_))));
    }
}
