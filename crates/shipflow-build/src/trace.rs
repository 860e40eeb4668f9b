//! 来歴 (トレース) 送信
//!
//! `{url}/api/v1/trace/{context}` に JSON を POST します。送信失敗は警告ログに
//! 残すだけで、ビルドの結果には影響しません。

use async_trait::async_trait;
use shipflow_core::{TraceSpec, Tracer};
use std::time::Duration;

/// 1リクエストあたりの送信タイムアウト
pub const DEFAULT_TRACE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HttpTracer {
    client: reqwest::Client,
    endpoint: Option<String>,
    timeout: Duration,
}

impl HttpTracer {
    pub fn new(client: reqwest::Client, spec: &TraceSpec) -> Self {
        let endpoint = spec.is_enabled().then(|| {
            format!(
                "{}/api/v1/trace/{}",
                spec.url.trim_end_matches('/'),
                spec.context
            )
        });
        Self {
            client,
            endpoint,
            timeout: DEFAULT_TRACE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_enabled(&self) -> bool {
        self.endpoint.is_some()
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }
}

/// ペイロードに種別 (`type`) を付与
fn with_kind(kind: &str, payload: serde_json::Value) -> serde_json::Value {
    match payload {
        serde_json::Value::Object(mut map) => {
            map.insert("type".to_string(), serde_json::Value::from(kind));
            serde_json::Value::Object(map)
        }
        other => serde_json::json!({ "type": kind, "data": other }),
    }
}

#[async_trait]
impl Tracer for HttpTracer {
    async fn add_image_metadata(&self, kind: &str, payload: serde_json::Value) {
        let Some(endpoint) = &self.endpoint else {
            tracing::debug!("Tracing disabled, dropping {} metadata", kind);
            return;
        };

        let body = with_kind(kind, payload);
        let request = self.client.post(endpoint).timeout(self.timeout).json(&body);
        match request.send().await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!("Sent {} metadata to {}", kind, endpoint);
            }
            Ok(response) => {
                tracing::warn!(
                    "Trace request to {} returned {}",
                    endpoint,
                    response.status()
                );
            }
            Err(e) => tracing::warn!("Trace request failed: {}", e),
        }
    }
}
