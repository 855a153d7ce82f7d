use anyhow::{Result, bail};
use futures_util::StreamExt;
use reqwest::{Client, Response};
use std::time::Duration;

/// Maximum outbound request body: 50 MiB.
pub const MAX_REQUEST_BYTES: usize = 50 * 1024 * 1024;

/// Maximum response body drained into memory: 50 MiB.
pub const MAX_RESPONSE_BYTES: usize = 50 * 1024 * 1024;

/// Wall-clock bound on every outbound call.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Redirect hop limit.
const MAX_REDIRECTS: usize = 5;

/// Build the shared outbound `reqwest::Client`.
///
/// Bounded on every axis we control at the client level: 10 s connect,
/// 30 s overall, at most 5 redirects. No cookie jar — spec-declared cookie
/// parameters are serialised into an explicit `Cookie` header instead.
///
/// Falls back to the default client if the builder fails.
pub fn outbound_client() -> Client {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Read a response body into memory, capping it at `max_bytes`.
///
/// A `Content-Length` already over the cap is refused before any byte is
/// read. Bodies without one (chunked) are cut at the cap instead; the
/// returned flag reports the cut. Nothing is appended to the bytes, so
/// binary payloads survive truncation intact.
pub async fn limited_body(resp: Response, max_bytes: usize) -> Result<(Vec<u8>, bool)> {
    if let Some(declared) = resp.content_length()
        && declared as usize > max_bytes
    {
        bail!(
            "refusing response body: Content-Length {} is over the {}-byte cap",
            declared,
            max_bytes
        );
    }

    let mut body: Vec<u8> = Vec::new();
    let mut frames = resp.bytes_stream();
    while let Some(frame) = frames.next().await {
        let frame = frame?;
        let room = max_bytes - body.len();
        if frame.len() > room {
            body.extend_from_slice(&frame[..room]);
            return Ok((body, true));
        }
        body.extend_from_slice(&frame);
    }
    Ok((body, false))
}

/// String variant of [`limited_body`]: lossy UTF-8 conversion, with a
/// `\n[truncated]` marker appended when the cap was hit.
pub async fn limited_text(resp: Response, max_bytes: usize) -> Result<String> {
    let (bytes, clipped) = limited_body(resp, max_bytes).await?;
    let text = String::from_utf8_lossy(&bytes);
    Ok(if clipped {
        format!("{}\n[truncated]", text)
    } else {
        text.into_owned()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn limited_body_under_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/small"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .mount(&server)
            .await;

        let resp = outbound_client()
            .get(format!("{}/small", server.uri()))
            .send()
            .await
            .unwrap();
        let (bytes, clipped) = limited_body(resp, 1024).await.unwrap();
        assert_eq!(bytes, b"hello");
        assert!(!clipped);
    }

    #[tokio::test]
    async fn limited_body_refuses_oversized_content_length() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/big"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(100)))
            .mount(&server)
            .await;

        let resp = outbound_client()
            .get(format!("{}/big", server.uri()))
            .send()
            .await
            .unwrap();
        // Content-Length precheck fires before streaming
        assert!(limited_body(resp, 10).await.is_err());
    }

    #[tokio::test]
    async fn limited_text_appends_marker() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/chunked"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("y".repeat(100).into_bytes(), "text/plain"),
            )
            .mount(&server)
            .await;

        let resp = outbound_client()
            .get(format!("{}/chunked", server.uri()))
            .send()
            .await
            .unwrap();
        match limited_text(resp, 10).await {
            Ok(text) => assert!(text.ends_with("[truncated]")),
            // Content-Length was present, so the precheck fired instead
            Err(e) => assert!(e.to_string().contains("cap")),
        }
    }
}
