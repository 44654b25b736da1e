//! The HTTP transport seam.
//!
//! grit does not ship an HTTP client. The host injects anything that can
//! perform a plain request/response with a streaming body — a blocking
//! reqwest wrapper, a test double, a unix-socket shim. The protocol
//! engine builds [`HttpRequest`]s with the smart-HTTP URLs and content
//! types defined here and hands them to the injected [`HttpClient`].

use std::io::Read;

use crate::WireError;
use crate::advert::Service;

/// A single HTTP request.
pub struct HttpRequest {
    /// `GET` or `POST`.
    pub method: &'static str,
    /// Absolute URL.
    pub url: String,
    /// Header pairs, already including content types.
    pub headers: Vec<(String, String)>,
    /// Request body (empty for GET).
    pub body: Vec<u8>,
}

/// A single HTTP response with a streaming body.
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response headers.
    pub headers: Vec<(String, String)>,
    /// Body reader; the engine streams packfiles from it.
    pub body: Box<dyn Read + Send>,
}

impl HttpResponse {
    /// Drain the body into memory.
    pub fn into_bytes(mut self) -> Result<Vec<u8>, WireError> {
        let mut out = Vec::new();
        self.body.read_to_end(&mut out)?;
        Ok(out)
    }
}

/// The injected transport.
pub trait HttpClient: Send {
    /// Perform one request. Transport failures map to
    /// [`WireError::Http`] with status 0.
    fn request(&self, request: HttpRequest) -> Result<HttpResponse, WireError>;
}

/// Normalize a remote URL: validate the scheme and drop a trailing
/// slash (a `.git` suffix stays, git accepts both forms).
///
/// Returns the scheme-validated base URL, or the offending URL for
/// non-HTTP transports so the caller can raise `UnknownTransport`.
pub fn normalize_url(url: &str) -> Result<String, String> {
    let lowered = url.to_ascii_lowercase();
    if lowered.starts_with("http://") || lowered.starts_with("https://") {
        Ok(url.trim_end_matches('/').to_owned())
    } else {
        Err(url.to_owned())
    }
}

/// Rewrite a URL through a CORS proxy (`http.corsProxy`): the proxy URL
/// is prefixed and the target is appended path-style.
#[must_use]
pub fn apply_cors_proxy(proxy: &str, url: &str) -> String {
    format!("{}/{url}", proxy.trim_end_matches('/'))
}

/// URL of the ref advertisement for a service.
#[must_use]
pub fn info_refs_url(base: &str, service: Service) -> String {
    format!("{base}/info/refs?service={}", service.as_str())
}

/// URL a service request is POSTed to.
#[must_use]
pub fn service_url(base: &str, service: Service) -> String {
    format!("{base}/{}", service.as_str())
}

/// Content-type for a service POST body.
#[must_use]
pub fn request_content_type(service: Service) -> String {
    format!("application/x-{}-request", service.as_str())
}

/// Expected content-type of a service POST response.
#[must_use]
pub fn response_content_type(service: Service) -> String {
    format!("application/x-{}-result", service.as_str())
}

/// Build a GET for the advertisement, with optional protocol v2 ask and
/// basic-auth header.
#[must_use]
pub fn info_refs_request(
    base: &str,
    service: Service,
    want_v2: bool,
    auth: Option<&str>,
) -> HttpRequest {
    let mut headers = vec![("Accept".to_owned(), "*/*".to_owned())];
    if want_v2 {
        headers.push(("Git-Protocol".to_owned(), "version=2".to_owned()));
    }
    if let Some(auth) = auth {
        headers.push(("Authorization".to_owned(), auth.to_owned()));
    }
    HttpRequest {
        method: "GET",
        url: info_refs_url(base, service),
        headers,
        body: Vec::new(),
    }
}

/// Build a service POST.
#[must_use]
pub fn service_post(
    base: &str,
    service: Service,
    body: Vec<u8>,
    want_v2: bool,
    auth: Option<&str>,
) -> HttpRequest {
    let mut headers = vec![
        ("Content-Type".to_owned(), request_content_type(service)),
        ("Accept".to_owned(), response_content_type(service)),
    ];
    if want_v2 {
        headers.push(("Git-Protocol".to_owned(), "version=2".to_owned()));
    }
    if let Some(auth) = auth {
        headers.push(("Authorization".to_owned(), auth.to_owned()));
    }
    HttpRequest {
        method: "POST",
        url: service_url(base, service),
        headers,
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_match_smart_http_layout() {
        assert_eq!(
            info_refs_url("https://example.com/repo.git", Service::UploadPack),
            "https://example.com/repo.git/info/refs?service=git-upload-pack"
        );
        assert_eq!(
            service_url("https://example.com/repo.git", Service::ReceivePack),
            "https://example.com/repo.git/git-receive-pack"
        );
    }

    #[test]
    fn ssh_urls_are_not_http() {
        assert!(normalize_url("git@example.com:repo.git").is_err());
        assert!(normalize_url("ssh://git@example.com/repo").is_err());
        assert_eq!(
            normalize_url("https://example.com/repo/").unwrap(),
            "https://example.com/repo"
        );
    }

    #[test]
    fn cors_proxy_prefixes() {
        assert_eq!(
            apply_cors_proxy("https://proxy.example/", "https://host/repo.git"),
            "https://proxy.example/https://host/repo.git"
        );
    }

    #[test]
    fn content_types() {
        assert_eq!(
            request_content_type(Service::UploadPack),
            "application/x-git-upload-pack-request"
        );
        assert_eq!(
            response_content_type(Service::ReceivePack),
            "application/x-git-receive-pack-result"
        );
    }
}
