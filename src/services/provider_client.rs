//! services/provider_client.rs
//! Cliente HTTP del proveedor de voz/SMS.
//!
//! Una llamada de red por invocación, sin reintentos ni caché. Toda falla
//! vuelve como [`ProviderError`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::config::app_config::ProviderConfig;
use crate::errors::ProviderError;
use crate::models::outreach_model::AgentSelector;

const CALL_PATH: &str = "/voice/make-call";
const TEXT_PATH: &str = "/sms/send-message";

/// Despacho aceptado, identificado con el id del proveedor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderReceipt {
    pub provider_reference_id: String,
}

#[async_trait]
pub trait OutreachProvider: Send + Sync {
    async fn place_call(
        &self,
        to_number: &str,
        from_number: &str,
        agent_selector: &AgentSelector,
        initialization_values: Option<&serde_json::Value>,
    ) -> Result<ProviderReceipt, ProviderError>;

    async fn send_text(
        &self,
        to_number: &str,
        from_number: &str,
        message: &str,
        agent_selector: Option<&AgentSelector>,
        initialization_values: Option<&serde_json::Value>,
    ) -> Result<ProviderReceipt, ProviderError>;
}

#[derive(Serialize)]
struct CallPayload<'a> {
    to_number: &'a str,
    from_number: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    agent_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    agent_template_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    initialization_values: Option<&'a serde_json::Value>,
}

#[derive(Serialize)]
struct TextPayload<'a> {
    to_number: &'a str,
    from_number: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    agent_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    agent_template_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    initialization_values: Option<&'a serde_json::Value>,
}

#[derive(Clone)]
pub struct ProviderClient {
    http_client: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl ProviderClient {
    pub fn new(config: &ProviderConfig) -> anyhow::Result<Self> {
        let http_client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout: config.timeout,
        })
    }

    async fn post<P: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &P,
        id_fields: &[&str],
    ) -> Result<ProviderReceipt, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        log::info!("(post) POST {}", url);

        let resp = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::transport(format!("timed out after {:?}", self.timeout))
                } else {
                    ProviderError::transport(e.to_string())
                }
            })?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ProviderError::transport(format!("reading response body: {}", e)))?;

        log::info!("(post) {} respondió status={}", url, status);
        if !status.is_success() {
            log::error!("(post) La respuesta NO es exitosa. body='{}'", body);
            return Err(ProviderError::rejected(status.as_u16(), body));
        }

        let json: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
            ProviderError::malformed(status.as_u16(), body.clone(), &format!("not JSON ({})", e))
        })?;

        match extract_reference(&json, id_fields) {
            Some(provider_reference_id) => Ok(ProviderReceipt {
                provider_reference_id,
            }),
            None => Err(ProviderError::malformed(
                status.as_u16(),
                body,
                &format!("missing {}", id_fields.join(" or ")),
            )),
        }
    }
}

#[async_trait]
impl OutreachProvider for ProviderClient {
    async fn place_call(
        &self,
        to_number: &str,
        from_number: &str,
        agent_selector: &AgentSelector,
        initialization_values: Option<&serde_json::Value>,
    ) -> Result<ProviderReceipt, ProviderError> {
        let payload = CallPayload {
            to_number,
            from_number,
            agent_id: agent_selector.agent_id(),
            agent_template_id: agent_selector.agent_template_id(),
            initialization_values,
        };
        self.post(CALL_PATH, &payload, &["call_id"]).await
    }

    async fn send_text(
        &self,
        to_number: &str,
        from_number: &str,
        message: &str,
        agent_selector: Option<&AgentSelector>,
        initialization_values: Option<&serde_json::Value>,
    ) -> Result<ProviderReceipt, ProviderError> {
        let payload = TextPayload {
            to_number,
            from_number,
            message,
            agent_id: agent_selector.and_then(|s| s.agent_id()),
            agent_template_id: agent_selector.and_then(|s| s.agent_template_id()),
            initialization_values,
        };
        self.post(TEXT_PATH, &payload, &["message_id", "id"]).await
    }
}

/// Primer id no vacío entre `fields`; también acepta ids numéricos.
fn extract_reference(json: &serde_json::Value, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|field| match json.get(*field) {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
