//! Routing of intercepted requests to a caching strategy.

use regex::Regex;
use reqwest::Method;
use std::fmt;
use url::{Origin, Position, Url};

use crate::http::Request;

/// Strategy chosen for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
  /// Not intercepted; the request goes to the network untouched
  Passthrough,
  /// Exchange-rate API, network-first without HTTP caching
  Api,
  /// Page load, network-first with app-shell fallback
  Navigation,
  /// Same-origin or CDN asset, cache-first
  Static,
  /// Anything else, network with cache fallback
  Default,
}

impl fmt::Display for Route {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Route::Passthrough => write!(f, "passthrough"),
      Route::Api => write!(f, "api"),
      Route::Navigation => write!(f, "navigation"),
      Route::Static => write!(f, "static"),
      Route::Default => write!(f, "default"),
    }
  }
}

#[derive(Debug, Clone)]
pub struct Classifier {
  origin: Origin,
  api: Regex,
  cdn: Regex,
}

impl Classifier {
  pub fn new(scope: &Url, api: Regex, cdn: Regex) -> Self {
    Self {
      origin: scope.origin(),
      api,
      cdn,
    }
  }

  /// Assign exactly one route. Rules are checked in order, first match wins.
  pub fn classify(&self, request: &Request) -> Route {
    if request.method != Method::GET {
      return Route::Passthrough;
    }

    if self.api.is_match(request.url.as_str()) {
      return Route::Api;
    }

    if request.is_navigation() {
      return Route::Navigation;
    }

    if request.url.origin() == self.origin || self.cdn.is_match(host(&request.url)) {
      return Route::Static;
    }

    Route::Default
  }
}

/// Host with an explicit port, if any (`example.com:8443`).
fn host(url: &Url) -> &str {
  &url[Position::BeforeHost..Position::AfterPort]
}
