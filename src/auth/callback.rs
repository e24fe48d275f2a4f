//! Local listener that receives the OAuth redirect during `login`

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};

#[derive(serde::Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    error: Option<String>,
}

/// Host, port and path the redirect URI points at
fn listen_target(redirect_uri: &str) -> Result<(String, u16, String)> {
    let url = url::Url::parse(redirect_uri)
        .with_context(|| format!("Invalid redirect_uri: {}", redirect_uri))?;
    let host = url
        .host_str()
        .context("redirect_uri has no host")?
        .to_string();
    if host != "localhost" && host != "127.0.0.1" {
        anyhow::bail!(
            "redirect_uri must point at localhost to receive the code locally: {}",
            redirect_uri
        );
    }
    let port = url
        .port_or_known_default()
        .context("Could not determine port from redirect_uri")?;
    Ok(("127.0.0.1".to_string(), port, url.path().to_string()))
}

const SUCCESS_PAGE: &str = "<h1>Authentication successful!</h1><p>You can close this window and return to the terminal.</p>";

// The provider's error text is reported in the terminal, never echoed into HTML
const FAILURE_PAGE: &str = "<h1>Authentication failed</h1><p>See the terminal for details, then close this window and try again.</p>";

fn callback_page(outcome: &std::result::Result<String, String>) -> &'static str {
    match outcome {
        Ok(_) => SUCCESS_PAGE,
        Err(_) => FAILURE_PAGE,
    }
}

/// Wait for the provider to redirect the browser back with a code
pub async fn wait_for_code(redirect_uri: &str, timeout: Duration) -> Result<String> {
    use axum::{extract::Query, response::Html, routing::get, Router};

    let (host, port, path) = listen_target(redirect_uri)?;
    let (tx, rx) = oneshot::channel::<std::result::Result<String, String>>();
    let tx = Arc::new(Mutex::new(Some(tx)));

    let app = Router::new().route(
        &path,
        get(move |Query(query): Query<CallbackQuery>| {
            let tx = tx.clone();
            async move {
                let outcome = match (query.code, query.error) {
                    (Some(code), _) => Ok(code),
                    (None, error) => Err(error.unwrap_or_else(|| "unknown".to_string())),
                };
                let page = callback_page(&outcome);
                if let Some(sender) = tx.lock().await.take() {
                    let _ = sender.send(outcome);
                }
                Html(page)
            }
        }),
    );

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind OAuth callback listener to {}", addr))?;
    tracing::debug!("OAuth callback listener on {}{}", addr, path);

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("OAuth callback listener error: {}", e);
        }
    });

    let result = tokio::time::timeout(timeout, rx).await;
    server.abort();

    match result {
        Ok(Ok(Ok(code))) => Ok(code),
        Ok(Ok(Err(error))) => anyhow::bail!("Authorization was denied: {}", error),
        Ok(Err(_)) => anyhow::bail!("OAuth callback listener stopped unexpectedly"),
        Err(_) => anyhow::bail!(
            "Authentication timeout - no response after {} seconds. Please try again.",
            timeout.as_secs()
        ),
    }
}
