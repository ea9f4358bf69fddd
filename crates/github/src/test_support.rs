//! Mock GitHub servers for unit tests

use axum::Router;
use tokio::net::TcpListener;

use crate::client::GitHubSettings;

/// Serve `app` on an ephemeral localhost port and return its base URL.
pub async fn start_mock(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Settings with every endpoint pointed at `base`.
pub fn settings_for(base: &str) -> GitHubSettings {
    GitHubSettings {
        client_id: "test-client-id".into(),
        client_secret: "test-client-secret".into(),
        redirect_uri: "http://localhost:8000/auth/github/callback".into(),
        authorize_url: format!("{base}/login/oauth/authorize"),
        token_url: format!("{base}/login/oauth/access_token"),
        api_url: base.to_string(),
        max_repo_pages: 1,
    }
}
