//! Shared HTTP request helpers for CLI commands.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

pub fn base_url(port: u16) -> String {
    format!("http://127.0.0.1:{}/api", port)
}

/// Turn a non-2xx answer into an error carrying the daemon's message.
async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    bail!("btlinkd answered {}: {}", status, message.trim())
}

async fn send(request: reqwest::RequestBuilder, url: &str) -> Result<reqwest::Response> {
    let resp = request
        .send()
        .await
        .with_context(|| format!("failed to connect to btlinkd at {} (is it running?)", url))?;
    check(resp).await
}

pub async fn get_json<T: for<'de> Deserialize<'de>>(url: &str) -> Result<T> {
    send(reqwest::Client::new().get(url), url)
        .await?
        .json::<T>()
        .await
        .context("failed to parse response")
}

pub async fn get_text(url: &str) -> Result<String> {
    send(reqwest::Client::new().get(url), url)
        .await?
        .text()
        .await
        .context("failed to read response")
}

pub async fn post_json<T: for<'de> Deserialize<'de>>(url: &str) -> Result<T> {
    send(reqwest::Client::new().post(url), url)
        .await?
        .json::<T>()
        .await
        .context("failed to parse response")
}

pub async fn post_json_body<T, R>(url: &str, body: &T) -> Result<R>
where
    T: Serialize,
    R: for<'de> Deserialize<'de>,
{
    send(reqwest::Client::new().post(url).json(body), url)
        .await?
        .json::<R>()
        .await
        .context("failed to parse response")
}
