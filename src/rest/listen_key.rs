//! Binance listen key client
//!
//! `POST` issues, `PUT` keeps alive, `DELETE` closes a user-data listen key.
//! All three only need the API key header; no request signing.

use crate::infrastructure::config::RestConfig;
use crate::log_rest;
use crate::rest::{CredentialSource, RestError};
use async_trait::async_trait;
use reqwest::{Method, Response};
use serde::Deserialize;
use tracing::Level;
use url::Url;

const API_KEY_HEADER: &str = "X-MBX-APIKEY";

#[derive(Debug, Deserialize)]
struct ListenKeyResponse {
    #[serde(rename = "listenKey")]
    listen_key: String,
}

/// REST client for `/api/v3/userDataStream`
pub struct ListenKeyClient {
    http: reqwest::Client,
    endpoint: Url,
    /// Checked per request so market-data-only setups need no key
    api_key: Option<String>,
}

impl ListenKeyClient {
    pub const USER_DATA_PATH: &'static str = "/api/v3/userDataStream";

    pub fn new(config: &RestConfig) -> Result<Self, RestError> {
        let api_key = config.resolved_api_key();
        let endpoint = Url::parse(&config.base_url)?.join(Self::USER_DATA_PATH)?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            http,
            endpoint,
            api_key,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn send(&self, method: Method, listen_key: Option<&str>) -> Result<Response, RestError> {
        let api_key = self.api_key.as_deref().ok_or(RestError::MissingApiKey)?;
        let mut request = self
            .http
            .request(method.clone(), self.endpoint.clone())
            .header(API_KEY_HEADER, api_key);
        if let Some(key) = listen_key {
            request = request.query(&[("listenKey", key)]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log_rest!(
                Level::WARN,
                %method,
                status = status.as_u16(),
                %body,
                "Listen key request rejected"
            );
            return Err(RestError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl CredentialSource for ListenKeyClient {
    async fn issue_key(&self) -> Result<String, RestError> {
        let response = self.send(Method::POST, None).await?;
        let body: ListenKeyResponse = serde_json::from_slice(&response.bytes().await?)?;
        log_rest!(Level::DEBUG, "Issued listen key");
        Ok(body.listen_key)
    }

    async fn renew_key(&self, key: &str) -> Result<String, RestError> {
        match self.send(Method::PUT, Some(key)).await {
            Ok(_) => Ok(key.to_string()),
            // Expired or unknown key: the stream has to move to a fresh one
            Err(e) if e.is_rejected() => {
                log_rest!(Level::INFO, "Keepalive rejected, issuing a new listen key");
                self.issue_key().await
            }
            Err(e) => Err(e),
        }
    }

    async fn revoke_key(&self, key: &str) -> Result<(), RestError> {
        self.send(Method::DELETE, Some(key)).await?;
        log_rest!(Level::DEBUG, "Revoked listen key");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn config(base_url: &str) -> RestConfig {
        RestConfig {
            base_url: base_url.to_string(),
            api_key: "test-key".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_endpoint() {
        let client = ListenKeyClient::new(&config("https://api.binance.com")).unwrap();
        assert_eq!(
            client.endpoint().as_str(),
            "https://api.binance.com/api/v3/userDataStream"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let result = ListenKeyClient::new(&config("::not a url"));
        assert!(matches!(result, Err(RestError::Url(_))));
    }

    #[test]
    fn test_listen_key_response() {
        let body =
            r#"{"listenKey":"pqia91ma19a5s61cv6a81va65sdf19v8a65a1a5s61cv6a81va65sdf19v8a65a1"}"#;
        let parsed: ListenKeyResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.listen_key.len(), 64);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_http_error() {
        let client = ListenKeyClient::new(&config("http://127.0.0.1:1")).unwrap();
        let result = client.issue_key().await;
        assert!(matches!(result, Err(RestError::Http(_))));
    }

    #[tokio::test]
    async fn test_missing_api_key_rejected_before_request() {
        let client = ListenKeyClient {
            http: reqwest::Client::new(),
            endpoint: Url::parse("http://127.0.0.1:1/api/v3/userDataStream").unwrap(),
            api_key: None,
        };
        let result = client.renew_key("abc").await;
        assert!(matches!(result, Err(RestError::MissingApiKey)));
    }

    /// Serves one scripted `(status line, body)` per connection and records
    /// each request line
    async fn scripted_server(
        replies: Vec<(&'static str, &'static str)>,
    ) -> (String, Arc<parking_lot::Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);

        tokio::spawn(async move {
            for (status, body) in replies {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    head.extend_from_slice(&buf[..n]);
                }
                let text = String::from_utf8_lossy(&head);
                seen.lock().push(text.lines().next().unwrap_or_default().to_string());

                let reply = format!(
                    concat!(
                        "HTTP/1.1 {}\r\n",
                        "content-type: application/json\r\n",
                        "content-length: {}\r\n",
                        "connection: close\r\n\r\n{}",
                    ),
                    status,
                    body.len(),
                    body
                );
                socket.write_all(reply.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });

        (base_url, requests)
    }

    #[tokio::test]
    async fn test_expired_key_is_reissued() {
        let (base_url, requests) = scripted_server(vec![
            ("400 Bad Request", r#"{"code":-1125,"msg":"This listenKey does not exist."}"#),
            ("200 OK", r#"{"listenKey":"fresh"}"#),
        ])
        .await;
        let client = ListenKeyClient::new(&config(&base_url)).unwrap();

        assert_eq!(client.renew_key("stale").await.unwrap(), "fresh");
        let requests = requests.lock().clone();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].starts_with("PUT /api/v3/userDataStream?listenKey=stale"));
        assert!(requests[1].starts_with("POST /api/v3/userDataStream"));
    }

    #[tokio::test]
    async fn test_server_error_keeps_key() {
        let (base_url, requests) = scripted_server(vec![("503 Service Unavailable", "")]).await;
        let client = ListenKeyClient::new(&config(&base_url)).unwrap();

        let result = client.renew_key("current").await;
        assert!(matches!(result, Err(RestError::Status { status: 503, .. })));
        assert_eq!(requests.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_issue_response() {
        let (base_url, _) = scripted_server(vec![("200 OK", "not json")]).await;
        let client = ListenKeyClient::new(&config(&base_url)).unwrap();

        let result = client.issue_key().await;
        assert!(matches!(result, Err(RestError::Malformed(_))));
    }
}
