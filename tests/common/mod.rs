//! Shared test doubles.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use zapdriver::domain::ports::control_api::{ApiCategory, ApiError, ApiResponse, ControlApi};

/// One recorded control-API call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub component: String,
    pub category: &'static str,
    pub method: String,
    pub params: Vec<(String, String)>,
}

type Handler = Box<dyn Fn(&str, &str, usize) -> Result<ApiResponse, ApiError> + Send + Sync>;

/// In-memory [`ControlApi`] that records every call and answers from a
/// programmable handler. The handler receives the component, method, and
/// how many times that pair has been called before.
pub struct RecordingApi {
    calls: Mutex<Vec<RecordedCall>>,
    seen: Mutex<BTreeMap<(String, String), usize>>,
    handler: Handler,
}

impl RecordingApi {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, &str, usize) -> Result<ApiResponse, ApiError> + Send + Sync + 'static,
    {
        Self {
            calls: Mutex::new(Vec::new()),
            seen: Mutex::new(BTreeMap::new()),
            handler: Box::new(handler),
        }
    }

    /// An API that answers everything with an OK element.
    pub fn always_ok() -> Self {
        Self::new(|_, _, _| Ok(ApiResponse::Element("OK".into())))
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, component: &str, method: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.component == component && c.method == method)
            .count()
    }
}

/// Build an element response from a scalar.
pub fn element(value: &str) -> ApiResponse {
    ApiResponse::Element(value.to_string())
}

/// Build a response from a JSON envelope literal.
pub fn envelope(value: Value) -> ApiResponse {
    ApiResponse::from_json(&value).expect("test envelope should decode")
}

#[async_trait]
impl ControlApi for RecordingApi {
    async fn call(
        &self,
        component: &str,
        category: ApiCategory,
        method: &str,
        params: &[(&str, String)],
    ) -> Result<ApiResponse, ApiError> {
        self.calls.lock().unwrap().push(RecordedCall {
            component: component.to_string(),
            category: category.as_str(),
            method: method.to_string(),
            params: params
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect(),
        });
        let nth = {
            let mut seen = self.seen.lock().unwrap();
            let entry = seen
                .entry((component.to_string(), method.to_string()))
                .or_insert(0);
            let nth = *entry;
            *entry += 1;
            nth
        };
        (self.handler)(component, method, nth)
    }

    async fn fetch_other(
        &self,
        component: &str,
        method: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<u8>, ApiError> {
        self.calls.lock().unwrap().push(RecordedCall {
            component: component.to_string(),
            category: "other",
            method: method.to_string(),
            params: params
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect(),
        });
        Ok(format!("<{method}/>").into_bytes())
    }
}
