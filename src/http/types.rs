//! Request and response values exchanged between pages, caches and the network.

use bytes::Bytes;
use reqwest::Method;
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

/// How the page issued the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RequestMode {
  /// Top-level document load
  Navigate,
  /// Subresource fetch
  #[default]
  Cors,
}

/// An intercepted outgoing request.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub mode: RequestMode,
}

impl Request {
  /// A plain GET subresource request.
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::GET,
      url,
      mode: RequestMode::default(),
    }
  }

  /// A GET issued as a page navigation.
  pub fn navigate(url: Url) -> Self {
    Self {
      method: Method::GET,
      url,
      mode: RequestMode::Navigate,
    }
  }

  pub fn with_method(mut self, method: Method) -> Self {
    self.method = method;
    self
  }

  pub fn is_navigation(&self) -> bool {
    self.mode == RequestMode::Navigate
  }

  /// The identity this request is cached under.
  pub fn identity(&self) -> RequestIdentity {
    RequestIdentity::new(self.method.clone(), self.url.clone())
  }
}

/// Cache key of a request: method plus URL with the fragment dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestIdentity {
  method: Method,
  url: Url,
}

impl RequestIdentity {
  pub fn new(method: Method, mut url: Url) -> Self {
    url.set_fragment(None);
    Self { method, url }
  }

  pub fn get(url: Url) -> Self {
    Self::new(Method::GET, url)
  }

  pub fn method(&self) -> &Method {
    &self.method
  }

  pub fn url(&self) -> &Url {
    &self.url
  }

  /// Only GET identities are ever written to a cache.
  pub fn is_cacheable(&self) -> bool {
    self.method == Method::GET
  }

  /// Stable, fixed-length storage key.
  pub fn cache_key(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.to_string().as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl fmt::Display for RequestIdentity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.method, self.url)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
  Basic,
  /// Network error, carries no status or body
  Error,
}

/// A response as delivered to the page or kept in a cache.
///
/// The body is immutable shared bytes, so `clone()` yields an independent
/// duplicate that can be stored while the original is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Bytes,
  pub response_type: ResponseType,
}

impl Response {
  pub fn new(status: u16, headers: Vec<(String, String)>, body: impl Into<Bytes>) -> Self {
    Self {
      status,
      headers,
      body: body.into(),
      response_type: ResponseType::Basic,
    }
  }

  /// The network-error response: status 0, no headers, no body.
  pub fn error() -> Self {
    Self {
      status: 0,
      headers: Vec::new(),
      body: Bytes::new(),
      response_type: ResponseType::Error,
    }
  }

  /// Placeholder handed to JSON callers when nothing else is available.
  pub fn empty_json() -> Self {
    Self::new(
      200,
      vec![("content-type".to_string(), "application/json".to_string())],
      Bytes::from_static(b"{}"),
    )
  }

  pub fn ok(&self) -> bool {
    (200..=299).contains(&self.status)
  }

  pub fn is_network_error(&self) -> bool {
    self.response_type == ResponseType::Error
  }

  /// 206 responses only cover a byte range and are never cached.
  pub fn is_partial(&self) -> bool {
    self.status == 206
  }

  /// Case-insensitive header lookup.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(key, _)| key.eq_ignore_ascii_case(name))
      .map(|(_, value)| value.as_str())
  }
}

/// Whether intermediate HTTP caches may answer a fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetchCache {
  #[default]
  Default,
  NoStore,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[test]
  fn test_identity_ignores_fragment() {
    let a = RequestIdentity::get(url("https://app.example/index.html#top"));
    let b = RequestIdentity::get(url("https://app.example/index.html"));
    assert_eq!(a, b);
    assert_eq!(a.cache_key(), b.cache_key());
  }

  #[test]
  fn test_identity_keeps_query() {
    let a = RequestIdentity::get(url("https://app.example/rates?base=USD"));
    let b = RequestIdentity::get(url("https://app.example/rates?base=EUR"));
    assert_ne!(a.cache_key(), b.cache_key());
  }

  #[test]
  fn test_identity_distinguishes_method() {
    let get = RequestIdentity::get(url("https://app.example/"));
    let post = RequestIdentity::new(Method::POST, url("https://app.example/"));
    assert_ne!(get.cache_key(), post.cache_key());
    assert!(get.is_cacheable());
    assert!(!post.is_cacheable());
  }

  #[test]
  fn test_cache_key_is_hex_sha256() {
    let key = RequestIdentity::get(url("https://app.example/")).cache_key();
    assert_eq!(key.len(), 64);
    assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
  }

  #[test]
  fn test_error_response() {
    let response = Response::error();
    assert!(response.is_network_error());
    assert!(!response.ok());
    assert_eq!(response.status, 0);
    assert!(response.body.is_empty());
  }

  #[test]
  fn test_empty_json_response() {
    let response = Response::empty_json();
    assert!(response.ok());
    assert_eq!(&response.body[..], b"{}");
    assert_eq!(response.header("Content-Type"), Some("application/json"));
  }

  #[test]
  fn test_navigation_flag() {
    assert!(Request::navigate(url("https://app.example/")).is_navigation());
    assert!(!Request::get(url("https://app.example/")).is_navigation());
  }
}
