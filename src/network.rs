use std::time::Duration;

use crate::config::Config;

/// Fetches one URL. Implementations must be shareable across worker threads.
pub trait Downloader: Send + Sync {
    fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

/// Response of a completed request. Non-2xx statuses are still `Ok`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// URL after redirects.
    pub url: String,
    pub status: u16,
    pub content: String,
    pub content_type: Option<String>,
}

impl FetchedPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.to_ascii_lowercase().contains("html"))
            .unwrap_or(true)
    }
}

/// Blocking HTTP client used by worker threads.
#[derive(Debug)]
pub struct HttpClient {
    client: reqwest::blocking::Client,
    user_agent: String,
    max_content_size: usize,
}

impl HttpClient {
    pub fn new(user_agent: &str, timeout_secs: u64) -> Result<Self, FetchError> {
        Self::with_content_limit(user_agent, timeout_secs, Config::MAX_CONTENT_SIZE)
    }

    pub fn with_content_limit(
        user_agent: &str,
        timeout_secs: u64,
        max_content_size: usize,
    ) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(Config::CONNECT_TIMEOUT_SECS))
            .pool_max_idle_per_host(Config::POOL_IDLE_PER_HOST)
            .pool_idle_timeout(Duration::from_secs(Config::POOL_IDLE_TIMEOUT_SECS))
            .http1_only()
            .tcp_nodelay(true)
            .redirect(reqwest::redirect::Policy::limited(Config::MAX_REDIRECTS))
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self {
            client,
            user_agent: user_agent.to_string(),
            max_content_size,
        })
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Status of a HEAD request; used for liveness probing.
    pub fn head(&self, url: &str) -> Result<u16, FetchError> {
        let response = self
            .client
            .head(url)
            .send()
            .map_err(Self::classify_error)?;
        Ok(response.status().as_u16())
    }

    fn get(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let response = self
            .client
            .get(url)
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header("Accept-Language", "en-US,en;q=0.5")
            .send()
            .map_err(Self::classify_error)?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|h| h.to_str().ok())
            .map(|s| s.to_string());

        if let Some(length) = response.content_length() {
            if length as usize > self.max_content_size {
                return Err(FetchError::ContentTooLarge(length as usize, self.max_content_size));
            }
        }

        let content = response
            .text()
            .map_err(|e| FetchError::BodyError(e.to_string()))?;

        if content.len() > self.max_content_size {
            return Err(FetchError::ContentTooLarge(content.len(), self.max_content_size));
        }

        Ok(FetchedPage {
            url: final_url,
            status,
            content,
            content_type,
        })
    }

    fn classify_error(error: reqwest::Error) -> FetchError {
        if error.is_timeout() {
            return FetchError::Timeout;
        }

        let error_msg = error.to_string().to_lowercase();
        if error_msg.contains("connection refused") {
            return FetchError::ConnectionRefused;
        }
        if error_msg.contains("dns") || error_msg.contains("name resolution") {
            return FetchError::DnsError;
        }
        if error_msg.contains("ssl") || error_msg.contains("tls") || error_msg.contains("certificate") {
            return FetchError::SslError;
        }
        if error.is_builder() {
            return FetchError::InvalidUrl(error.to_string());
        }

        FetchError::NetworkError(error.to_string())
    }
}

impl Downloader for HttpClient {
    /// One attempt per call. A failed URL is dropped by the worker, not retried here.
    fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        self.get(url)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Connection refused - server not accepting connections")]
    ConnectionRefused,

    #[error("DNS resolution failed")]
    DnsError,

    #[error("SSL/TLS error - certificate or encryption issue")]
    SslError,

    #[error("Request timeout")]
    Timeout,

    #[error("Failed to read response body: {0}")]
    BodyError(String),

    #[error("Content too large: {0} bytes (max: {1} bytes)")]
    ContentTooLarge(usize, usize),
}

impl FetchError {
    /// Whether the failure looks temporary (timeouts, resets). Only used for logging.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout => true,
            FetchError::NetworkError(msg) => {
                let msg_lower = msg.to_lowercase();
                msg_lower.contains("timeout")
                    || msg_lower.contains("broken pipe")
                    || msg_lower.contains("connection reset")
                    || msg_lower.contains("temporary")
            }
            FetchError::Client(_)
            | FetchError::InvalidUrl(_)
            | FetchError::ConnectionRefused
            | FetchError::DnsError
            | FetchError::SslError
            | FetchError::BodyError(_)
            | FetchError::ContentTooLarge(_, _) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fetch_invalid_url() {
        let client = HttpClient::new("TestBot/1.0", 5).unwrap();
        assert!(client.fetch("not-a-url").is_err());
    }

    #[test]
    fn test_http_client_creation() {
        let client = HttpClient::new("TestBot/1.0", 30).unwrap();
        assert_eq!(client.user_agent(), "TestBot/1.0");
    }

    #[test]
    fn test_transient_classification() {
        assert!(FetchError::Timeout.is_transient());
        assert!(FetchError::NetworkError("connection reset by peer".into()).is_transient());
        assert!(!FetchError::DnsError.is_transient());
        assert!(!FetchError::ContentTooLarge(20, 10).is_transient());
    }

    #[test]
    fn test_timeout_is_not_retried() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&connections);

        // Accepts and never answers.
        thread::spawn(move || {
            let mut held = Vec::new();
            for stream in listener.incoming().flatten() {
                seen.fetch_add(1, Ordering::SeqCst);
                held.push(stream);
            }
        });

        let client = HttpClient::new("TestBot/1.0", 1).unwrap();
        assert!(client.fetch(&format!("http://{}/slow", addr)).is_err());

        thread::sleep(Duration::from_millis(200));
        assert_eq!(connections.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_page_status_and_type() {
        let page = FetchedPage {
            url: "https://www.ics.uci.edu".into(),
            status: 204,
            content: String::new(),
            content_type: Some("text/HTML; charset=utf-8".into()),
        };
        assert!(page.is_success());
        assert!(page.is_html());

        let missing = FetchedPage {
            status: 404,
            content_type: Some("application/pdf".into()),
            ..page
        };
        assert!(!missing.is_success());
        assert!(!missing.is_html());
    }
}
