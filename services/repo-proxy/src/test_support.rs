//! In-process stand-in for the upstream provider

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::Secret;
use provider::{ContentLocation, Provider, ProviderHealth, Result, UpstreamError};
use serde_json::{Value, json};

/// Canned upstream. Every network-shaped call bumps `upstream_calls`.
pub struct StubProvider {
    pub token: Mutex<String>,
    pub profile: Value,
    pub repos: Value,
    pub contents: Value,
    pub file: Value,
    pub exchange_error: Option<fn() -> UpstreamError>,
    pub profile_error: Option<fn() -> UpstreamError>,
    pub repos_error: Option<fn() -> UpstreamError>,
    pub contents_error: Option<fn() -> UpstreamError>,
    pub codes: Mutex<Vec<String>>,
    pub seen_tokens: Mutex<Vec<String>>,
    pub seen_locations: Mutex<Vec<ContentLocation>>,
    pub upstream_calls: AtomicUsize,
}

impl Default for StubProvider {
    fn default() -> Self {
        Self {
            token: Mutex::new("tok_1".to_string()),
            profile: json!({"id": 42, "login": "alice"}),
            repos: json!([{"name": "hello-world", "private": true}]),
            contents: json!([{"name": "README.md", "path": "README.md", "type": "file"}]),
            file: json!({
                "name": "README.md",
                "path": "README.md",
                "size": 5,
                "encoding": "base64",
                "content": "aGVsbG8=",
            }),
            exchange_error: None,
            profile_error: None,
            repos_error: None,
            contents_error: None,
            codes: Mutex::new(Vec::new()),
            seen_tokens: Mutex::new(Vec::new()),
            seen_locations: Mutex::new(Vec::new()),
            upstream_calls: AtomicUsize::new(0),
        }
    }
}

impl StubProvider {
    fn call(&self, token: Option<&Secret<String>>) {
        self.upstream_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(token) = token {
            self.seen_tokens.lock().unwrap().push(token.expose().clone());
        }
    }

    fn contents_result(&self, location: &ContentLocation, value: &Value) -> Result<Value> {
        self.seen_locations.lock().unwrap().push(location.clone());
        match self.contents_error {
            Some(make) => Err(make()),
            None => Ok(value.clone()),
        }
    }
}

impl Provider for StubProvider {
    fn id(&self) -> &str {
        "stub"
    }

    fn authorization_url(&self, state: &str) -> String {
        format!("https://stub.test/login/oauth/authorize?client_id=stub&state={state}")
    }

    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Secret<String>>> + Send + 'a>> {
        self.call(None);
        self.codes.lock().unwrap().push(code.to_string());
        let result = match self.exchange_error {
            Some(make) => Err(make()),
            None => Ok(Secret::new(self.token.lock().unwrap().clone())),
        };
        Box::pin(async move { result })
    }

    fn fetch_profile<'a>(
        &'a self,
        token: &'a Secret<String>,
    ) -> Pin<Box<dyn Future<Output = Result<Value>> + Send + 'a>> {
        self.call(Some(token));
        let result = match self.profile_error {
            Some(make) => Err(make()),
            None => Ok(self.profile.clone()),
        };
        Box::pin(async move { result })
    }

    fn list_repositories<'a>(
        &'a self,
        token: &'a Secret<String>,
    ) -> Pin<Box<dyn Future<Output = Result<Value>> + Send + 'a>> {
        self.call(Some(token));
        let result = match self.repos_error {
            Some(make) => Err(make()),
            None => Ok(self.repos.clone()),
        };
        Box::pin(async move { result })
    }

    fn list_contents<'a>(
        &'a self,
        token: &'a Secret<String>,
        location: &'a ContentLocation,
    ) -> Pin<Box<dyn Future<Output = Result<Value>> + Send + 'a>> {
        self.call(Some(token));
        let result = self.contents_result(location, &self.contents);
        Box::pin(async move { result })
    }

    fn get_file<'a>(
        &'a self,
        token: &'a Secret<String>,
        location: &'a ContentLocation,
    ) -> Pin<Box<dyn Future<Output = Result<Value>> + Send + 'a>> {
        self.call(Some(token));
        let result = self.contents_result(location, &self.file);
        Box::pin(async move { result })
    }

    fn health(&self) -> ProviderHealth {
        ProviderHealth {
            status: "healthy".to_string(),
            detail: None,
        }
    }
}
