use futures_util::StreamExt;
use memoh_core::config::AgentGatewayConfig;
use memoh_core::error::{MemohError, Result};
use memoh_sse::SseDecoder;
use reqwest::Client;
use tokio::sync::mpsc;

use crate::event::parse_event;
use crate::gateway_types::{GatewayChatPayload, GatewayChatResponse};

const ERROR_BODY_SNIPPET_BYTES: usize = 300;

pub struct GatewayClient {
    http: Client,
    config: AgentGatewayConfig,
}

impl GatewayClient {
    pub fn new(config: AgentGatewayConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MemohError::Gateway(e.to_string()))?;
        Ok(Self { http, config })
    }

    fn request(&self, path: &str, payload: &GatewayChatPayload) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        let mut builder = self.http.post(url).json(payload);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }

    /// `POST /chat/` per §6.1's blocking contract.
    pub async fn chat(&self, payload: &GatewayChatPayload) -> Result<GatewayChatResponse> {
        let response = self
            .request("/chat/", payload)
            .send()
            .await
            .map_err(|e| MemohError::Gateway(e.to_string()))?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(MemohError::Gateway(snippet(&body)));
        }
        serde_json::from_str(&body).map_err(|e| MemohError::GatewayParse(e.to_string()))
    }

    /// `POST /chat/trigger-schedule` with the same payload plus a `schedule`
    /// sub-object (caller sets `payload.schedule` before calling).
    pub async fn trigger_schedule(&self, payload: &GatewayChatPayload) -> Result<GatewayChatResponse> {
        let response = self
            .request("/chat/trigger-schedule", payload)
            .send()
            .await
            .map_err(|e| MemohError::Gateway(e.to_string()))?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(MemohError::Gateway(snippet(&body)));
        }
        serde_json::from_str(&body).map_err(|e| MemohError::GatewayParse(e.to_string()))
    }

    /// `POST /chat/stream`, decoded per §4.1 with the 2 MiB line ceiling.
    /// Events are pushed onto the returned channel as they decode; the
    /// channel closes when the stream ends or a terminal event is emitted.
    pub async fn chat_stream(&self, payload: &GatewayChatPayload) -> Result<mpsc::Receiver<Result<memoh_core::StreamEvent>>> {
        let response = self
            .request("/chat/stream", payload)
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| MemohError::Gateway(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MemohError::Gateway(snippet(&body)));
        }

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let mut decoder = SseDecoder::new();
            let mut byte_stream = response.bytes_stream();
            let mut current_kind: Option<String> = None;

            while let Some(chunk) = byte_stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx.send(Err(MemohError::Gateway(e.to_string()))).await;
                        return;
                    }
                };
                let events = match decoder.push(&chunk) {
                    Ok(events) => events,
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                };
                for evt in events {
                    current_kind = evt.kind.clone();
                    let parsed = parse_event(current_kind.as_deref(), &evt.data);
                    let is_terminal = matches!(&parsed, Ok(e) if e.is_terminal());
                    if tx.send(parsed).await.is_err() {
                        return;
                    }
                    if is_terminal {
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }
}

fn snippet(body: &str) -> String {
    if body.len() <= ERROR_BODY_SNIPPET_BYTES {
        return body.to_string();
    }
    let mut end = ERROR_BODY_SNIPPET_BYTES;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_truncates_at_300_bytes() {
        let body = "x".repeat(1000);
        assert_eq!(snippet(&body).len(), ERROR_BODY_SNIPPET_BYTES);
    }

    #[test]
    fn snippet_passes_short_body_through() {
        assert_eq!(snippet("short"), "short");
    }

    #[test]
    fn snippet_respects_utf8_boundaries() {
        let body = "é".repeat(200);
        let cut = snippet(&body);
        assert!(cut.is_char_boundary(cut.len()));
    }
}
