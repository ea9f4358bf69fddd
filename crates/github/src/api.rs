//! Authenticated REST reads
//!
//! Every call injects the bearer token and maps a non-success status to
//! `UpstreamError::Status` carrying GitHub's status code and message. Nothing
//! here retries: GitHub rate-limits per token, and a retry loop would burn
//! the user's quota.

use common::Secret;
use provider::{ContentLocation, Result, UpstreamError};
use reqwest::Url;
use reqwest::header::{ACCEPT, HeaderMap, LINK};
use serde_json::Value;
use tracing::{debug, warn};

use crate::constants::{API_VERSION, GITHUB_JSON};
use crate::link::next_link;

/// Profile of the token owner (`GET /user`).
pub async fn fetch_profile(
    client: &reqwest::Client,
    api_url: &str,
    token: &Secret<String>,
) -> Result<Value> {
    let url = endpoint(api_url, &["user"])?;
    let (profile, _) = get_json(client, url, token).await?;
    Ok(profile)
}

/// Repositories visible to the token owner (`GET /user/repos`), public and
/// private, most recently updated first.
///
/// With `max_pages == 1` the first page is returned exactly as GitHub sent
/// it. Larger values follow `Link: rel="next"` and concatenate the arrays.
pub async fn list_repositories(
    client: &reqwest::Client,
    api_url: &str,
    token: &Secret<String>,
    max_pages: u32,
) -> Result<Value> {
    let mut url = endpoint(api_url, &["user", "repos"])?;
    url.query_pairs_mut()
        .append_pair("visibility", "all")
        .append_pair("sort", "updated");
    let origin = url.origin();

    let (first, headers) = get_json(client, url, token).await?;
    let Value::Array(mut repos) = first else {
        return Ok(first);
    };

    let mut next = next_url(&headers);
    let mut pages = 1;
    while let Some(url) = next.take() {
        if pages >= max_pages {
            debug!(pages, "repository listing truncated at max_repo_pages");
            break;
        }
        if url.origin() != origin {
            warn!(next = %url, "ignoring pagination link to a different origin");
            break;
        }
        let (page, headers) = get_json(client, url, token).await?;
        match page {
            Value::Array(items) => repos.extend(items),
            other => {
                return Err(UpstreamError::InvalidResponse(format!(
                    "expected repository array on page {}, got {}",
                    pages + 1,
                    kind_of(&other)
                )));
            }
        }
        pages += 1;
        next = next_url(&headers);
    }

    Ok(Value::Array(repos))
}

/// Contents endpoint (`GET /repos/{owner}/{repo}/contents/{path}`).
///
/// A directory answers with an array of entries, a file with its
/// metadata + content envelope.
pub async fn get_contents(
    client: &reqwest::Client,
    api_url: &str,
    token: &Secret<String>,
    location: &ContentLocation,
) -> Result<Value> {
    let mut url = endpoint(
        api_url,
        &["repos", location.owner.as_str(), location.repo.as_str(), "contents"],
    )?;
    url.path_segments_mut()
        .map_err(|_| UpstreamError::InvalidResponse(format!("api_url cannot be a base: {api_url}")))?
        .extend(location.path_segments());
    let (contents, _) = get_json(client, url, token).await?;
    Ok(contents)
}

/// `api_url` with `segments` appended, each percent-encoded.
fn endpoint(api_url: &str, segments: &[&str]) -> Result<Url> {
    let mut url = Url::parse(api_url)
        .map_err(|e| UpstreamError::Http(format!("invalid api_url {api_url}: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| UpstreamError::Http(format!("api_url cannot be a base: {api_url}")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

async fn get_json(
    client: &reqwest::Client,
    url: Url,
    token: &Secret<String>,
) -> Result<(Value, HeaderMap)> {
    let path = url.path().to_string();
    let response = client
        .get(url)
        .bearer_auth(token.expose())
        .header(ACCEPT, GITHUB_JSON)
        .header("X-GitHub-Api-Version", API_VERSION)
        .send()
        .await
        .map_err(transport_error)?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        debug!(%path, status = status.as_u16(), "upstream rejected request");
        return Err(UpstreamError::status(status.as_u16(), error_message(&body)));
    }

    let headers = response.headers().clone();
    let json = response
        .json::<Value>()
        .await
        .map_err(|e| UpstreamError::InvalidResponse(format!("{path}: {e}")))?;
    Ok((json, headers))
}

fn transport_error(e: reqwest::Error) -> UpstreamError {
    if e.is_timeout() {
        UpstreamError::Timeout(e.to_string())
    } else {
        UpstreamError::Http(e.to_string())
    }
}

fn next_url(headers: &HeaderMap) -> Option<Url> {
    let header = headers.get(LINK)?.to_str().ok()?;
    Url::parse(next_link(header)?).ok()
}

/// GitHub error bodies are `{"message": "...", "documentation_url": "..."}`.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_owned))
        .unwrap_or_else(|| body.chars().take(200).collect())
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::start_mock;
    use axum::extract::{Query, Request};
    use axum::http::{HeaderMap as AxumHeaders, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    fn token() -> Secret<String> {
        Secret::from("tok_1")
    }

    #[tokio::test]
    async fn profile_request_carries_bearer_token_and_media_type() {
        let app = Router::new().route(
            "/user",
            get(|headers: AxumHeaders| async move {
                Json(json!({
                    "id": 42,
                    "login": "alice",
                    "authorization": headers.get("authorization").unwrap().to_str().unwrap(),
                    "accept": headers.get("accept").unwrap().to_str().unwrap(),
                }))
            }),
        );
        let base = start_mock(app).await;

        let profile = fetch_profile(&reqwest::Client::new(), &base, &token())
            .await
            .unwrap();
        assert_eq!(profile["id"], 42);
        assert_eq!(profile["authorization"], "Bearer tok_1");
        assert_eq!(profile["accept"], GITHUB_JSON);
    }

    #[tokio::test]
    async fn non_success_status_is_preserved_with_message() {
        let app = Router::new().route(
            "/user",
            get(|| async {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"message": "Bad credentials"})),
                )
            }),
        );
        let base = start_mock(app).await;

        let err = fetch_profile(&reqwest::Client::new(), &base, &token())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(401));
        assert!(err.to_string().contains("Bad credentials"), "got: {err}");
    }

    #[tokio::test]
    async fn repositories_request_all_visibility_sorted_by_update() {
        let app = Router::new().route(
            "/user/repos",
            get(|Query(query): Query<HashMap<String, String>>| async move {
                Json(json!([{"name": "hello", "query": query}]))
            }),
        );
        let base = start_mock(app).await;

        let repos = list_repositories(&reqwest::Client::new(), &base, &token(), 1)
            .await
            .unwrap();
        assert_eq!(repos[0]["query"]["visibility"], "all");
        assert_eq!(repos[0]["query"]["sort"], "updated");
    }

    /// Three pages of one repository each, linked with rel="next".
    fn paginated_app() -> Router {
        Router::new().route(
            "/user/repos",
            get(|request: Request| async move {
                let host = request.headers()["host"].to_str().unwrap().to_string();
                let query = request.uri().query().unwrap_or("").to_string();
                let page: u32 = query
                    .split('&')
                    .find_map(|p| p.strip_prefix("page="))
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(1);
                let mut headers = AxumHeaders::new();
                if page < 3 {
                    let link = format!(
                        "<http://{host}/user/repos?visibility=all&sort=updated&page={}>; rel=\"next\"",
                        page + 1
                    );
                    headers.insert("link", link.parse().unwrap());
                }
                (headers, Json(json!([{ "name": format!("repo-{page}") }]))).into_response()
            }),
        )
    }

    #[tokio::test]
    async fn single_page_mode_ignores_next_link() {
        let base = start_mock(paginated_app()).await;
        let repos = list_repositories(&reqwest::Client::new(), &base, &token(), 1)
            .await
            .unwrap();
        assert_eq!(repos.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn pagination_follows_next_links_up_to_limit() {
        let base = start_mock(paginated_app()).await;

        let two = list_repositories(&reqwest::Client::new(), &base, &token(), 2)
            .await
            .unwrap();
        let names: Vec<_> = two.as_array().unwrap().iter().map(|r| r["name"].clone()).collect();
        assert_eq!(names, vec![json!("repo-1"), json!("repo-2")]);

        let all = list_repositories(&reqwest::Client::new(), &base, &token(), 10)
            .await
            .unwrap();
        assert_eq!(all.as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn contents_path_is_built_from_segments() {
        let app = Router::new()
            .route(
                "/repos/{owner}/{repo}/contents",
                get(|| async { Json(json!([{"name": "src", "type": "dir"}])) }),
            )
            .route(
                "/repos/{owner}/{repo}/contents/{*path}",
                get(|request: Request| async move {
                    Json(json!({"requested": request.uri().path()}))
                }),
            );
        let base = start_mock(app).await;
        let client = reqwest::Client::new();

        let root = get_contents(&client, &base, &token(), &ContentLocation::new("octo", "hello", ""))
            .await
            .unwrap();
        assert_eq!(root[0]["name"], "src");

        let nested = get_contents(
            &client,
            &base,
            &token(),
            &ContentLocation::new("octo", "hello", "src/my file.rs"),
        )
        .await
        .unwrap();
        assert_eq!(nested["requested"], "/repos/octo/hello/contents/src/my%20file.rs");
    }

    #[tokio::test]
    async fn contents_404_is_preserved() {
        let app = Router::new().route(
            "/repos/{owner}/{repo}/contents/{*path}",
            get(|| async { (StatusCode::NOT_FOUND, Json(json!({"message": "Not Found"}))) }),
        );
        let base = start_mock(app).await;

        let err = get_contents(
            &reqwest::Client::new(),
            &base,
            &token(),
            &ContentLocation::new("octo", "hello", "missing.txt"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status_code(), Some(404));
    }

    #[tokio::test]
    async fn unreachable_upstream_is_a_transport_error() {
        let err = fetch_profile(&reqwest::Client::new(), "http://127.0.0.1:1", &token())
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Http(_)), "got: {err:?}");
    }

    #[test]
    fn endpoint_respects_api_path_prefix() {
        let url = endpoint("https://ghe.example.com/api/v3", &["user", "repos"]).unwrap();
        assert_eq!(url.as_str(), "https://ghe.example.com/api/v3/user/repos");

        let url = endpoint("https://api.github.com/", &["user"]).unwrap();
        assert_eq!(url.as_str(), "https://api.github.com/user");
    }

    #[test]
    fn error_message_falls_back_to_body() {
        assert_eq!(error_message(r#"{"message":"Not Found"}"#), "Not Found");
        assert_eq!(error_message("plain failure"), "plain failure");
    }
}
