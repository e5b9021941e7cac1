//! Reqwest adapter for the scanner's control API.
//!
//! Endpoint layout: `/JSON/{component}/{view|action}/{method}/` for typed
//! calls and `/OTHER/{component}/other/{method}/` for opaque payloads. Every
//! request carries the shared API key the scanner was launched with.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::domain::models::config::API_KEY;
use crate::domain::ports::control_api::{ApiCategory, ApiError, ApiResponse, ControlApi};

/// Calls issued while a scan phase is idle can still take the scanner a
/// while to answer (report rendering, session save).
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

pub struct ZapClient {
    http: reqwest::Client,
    base_url: String,
}

impl ZapClient {
    pub fn new(host: &str, port: u16) -> Result<Self, ApiError> {
        Self::with_base_url(format!("http://{host}:{port}"))
    }

    /// Point the client at an explicit base URL (test servers).
    pub fn with_base_url(base_url: String) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ApiError::Transport {
                component: String::new(),
                method: String::new(),
                reason: e.to_string(),
            })?;
        Ok(Self { http, base_url })
    }

    async fn get(
        &self,
        url: String,
        component: &str,
        method: &str,
        params: &[(&str, String)],
    ) -> Result<reqwest::Response, ApiError> {
        let mut query: Vec<(&str, &str)> = vec![("apikey", API_KEY)];
        query.extend(params.iter().map(|(k, v)| (*k, v.as_str())));
        self.http
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| ApiError::Transport {
                component: component.to_string(),
                method: method.to_string(),
                reason: e.to_string(),
            })
    }

    /// The scanner rejects bad requests with a `{code, message}` body;
    /// surface those as rejections rather than opaque HTTP failures.
    fn rejection(component: &str, method: &str, status: u16, body: &str) -> ApiError {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
            if let (Some(code), Some(message)) = (map.get("code"), map.get("message")) {
                return ApiError::Rejected {
                    component: component.to_string(),
                    method: method.to_string(),
                    message: format!(
                        "{} ({})",
                        message.as_str().unwrap_or_default(),
                        code.as_str().unwrap_or_default()
                    ),
                };
            }
        }
        ApiError::Http {
            component: component.to_string(),
            method: method.to_string(),
            status,
            body: body.to_string(),
        }
    }
}

#[async_trait]
impl ControlApi for ZapClient {
    async fn call(
        &self,
        component: &str,
        category: ApiCategory,
        method: &str,
        params: &[(&str, String)],
    ) -> Result<ApiResponse, ApiError> {
        let url = format!(
            "{}/JSON/{}/{}/{}/",
            self.base_url,
            component,
            category.as_str(),
            method
        );
        debug!(component, method, "control API call");
        let response = self.get(url, component, method, params).await?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| ApiError::Transport {
            component: component.to_string(),
            method: method.to_string(),
            reason: e.to_string(),
        })?;
        if !(200..300).contains(&status) {
            return Err(Self::rejection(component, method, status, &body));
        }
        let json: Value = serde_json::from_str(&body).map_err(|e| ApiError::Decode {
            component: component.to_string(),
            method: method.to_string(),
            reason: e.to_string(),
        })?;
        // Some scanner versions report rejections with a 200 status.
        if let Value::Object(map) = &json {
            if map.len() == 2 && map.contains_key("code") && map.contains_key("message") {
                return Err(Self::rejection(component, method, status, &body));
            }
        }
        ApiResponse::from_json(&json)
    }

    async fn fetch_other(
        &self,
        component: &str,
        method: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<u8>, ApiError> {
        let url = format!("{}/OTHER/{}/other/{}/", self.base_url, component, method);
        debug!(component, method, "control API payload fetch");
        let response = self.get(url, component, method, params).await?;
        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::rejection(component, method, status, &body));
        }
        let bytes = response.bytes().await.map_err(|e| ApiError::Transport {
            component: component.to_string(),
            method: method.to_string(),
            reason: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }
}
