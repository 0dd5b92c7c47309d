//! Entry points the host calls: install, activate and per-request interception.

use color_eyre::Result;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info};

use crate::cache::CacheStore;
use crate::classify::{Classifier, Route};
use crate::config::Settings;
use crate::generation::{GenerationManager, InstallReport};
use crate::http::{Fetcher, Request, RequestIdentity};
use crate::strategy::{Outcome, StrategyExecutor};

/// Lifecycle of the interceptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
  Parsed,
  Installing,
  Installed,
  Activating,
  Activated,
  /// Install or activate failed
  Redundant,
}

impl fmt::Display for Lifecycle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Lifecycle::Parsed => write!(f, "parsed"),
      Lifecycle::Installing => write!(f, "installing"),
      Lifecycle::Installed => write!(f, "installed"),
      Lifecycle::Activating => write!(f, "activating"),
      Lifecycle::Activated => write!(f, "activated"),
      Lifecycle::Redundant => write!(f, "redundant"),
    }
  }
}

/// What the host should do with an intercepted request.
#[derive(Debug, Clone)]
pub enum Intercept {
  /// Deliver this response to the page
  Respond(Outcome),
  /// Let the request continue to the network untouched
  Passthrough,
}

#[derive(Debug)]
struct State {
  lifecycle: Lifecycle,
  /// Activate as soon as installed, without waiting for old sessions
  skip_waiting: bool,
  /// Serving every open session, not only new ones
  controls_clients: bool,
}

pub struct Dispatcher<S: CacheStore, F: Fetcher> {
  classifier: Classifier,
  generations: GenerationManager<S, F>,
  executor: StrategyExecutor<S, F>,
  state: Mutex<State>,
}

impl<S: CacheStore, F: Fetcher> Dispatcher<S, F> {
  pub fn new(settings: &Settings, store: Arc<S>, fetcher: Arc<F>) -> Self {
    let classifier = Classifier::new(
      &settings.origin,
      settings.api_pattern.clone(),
      settings.cdn_pattern.clone(),
    );
    let generations = GenerationManager::new(
      store.clone(),
      fetcher.clone(),
      settings.names.clone(),
      settings.precache.clone(),
    );
    let executor = StrategyExecutor::new(
      store,
      fetcher,
      settings.names.clone(),
      RequestIdentity::get(settings.app_shell.clone()),
    );

    Self {
      classifier,
      generations,
      executor,
      state: Mutex::new(State {
        lifecycle: Lifecycle::Parsed,
        skip_waiting: false,
        controls_clients: false,
      }),
    }
  }

  pub fn lifecycle(&self) -> Lifecycle {
    self.with_state(|s| s.lifecycle)
  }

  /// Whether install asked to activate without waiting for old sessions.
  pub fn skips_waiting(&self) -> bool {
    self.with_state(|s| s.skip_waiting)
  }

  /// Whether activate took over already-open sessions.
  pub fn controls_clients(&self) -> bool {
    self.with_state(|s| s.controls_clients)
  }

  pub fn classify(&self, request: &Request) -> Route {
    self.classifier.classify(request)
  }

  /// Populate the static generation. Completes only once every precache
  /// attempt has finished.
  pub async fn on_install(&self) -> Result<InstallReport> {
    self.transition(Lifecycle::Installing);

    match self.generations.initialize().await {
      Ok(report) => {
        self.with_state(|s| {
          s.lifecycle = Lifecycle::Installed;
          s.skip_waiting = true;
        });
        Ok(report)
      }
      Err(e) => {
        self.transition(Lifecycle::Redundant);
        Err(e)
      }
    }
  }

  /// Drop superseded generations and take control of open sessions.
  pub async fn on_activate(&self) -> Result<Vec<String>> {
    self.transition(Lifecycle::Activating);

    match self.generations.reclaim().await {
      Ok(deleted) => {
        self.with_state(|s| {
          s.lifecycle = Lifecycle::Activated;
          s.controls_clients = true;
        });
        info!("Activated and controlling open sessions");
        Ok(deleted)
      }
      Err(e) => {
        self.transition(Lifecycle::Redundant);
        Err(e)
      }
    }
  }

  /// Decide how to answer one request.
  ///
  /// Never fails: a cache store error on the request path is logged and the
  /// page receives a network error response.
  pub async fn on_intercept(&self, request: &Request) -> Intercept {
    let route = self.classifier.classify(request);

    let result = match route {
      Route::Passthrough => return Intercept::Passthrough,
      Route::Api => self.executor.api(request).await,
      Route::Navigation => self.executor.navigation(request).await,
      Route::Static => self.executor.static_asset(request).await,
      Route::Default => self.executor.passthrough(request).await,
    };

    match result {
      Ok(outcome) => {
        debug!(
          url = %request.url,
          route = %route,
          source = ?outcome.source,
          status = outcome.response.status,
          "Request handled"
        );
        Intercept::Respond(outcome)
      }
      Err(e) => {
        error!(url = %request.url, route = %route, error = %e, "Cache store failure");
        Intercept::Respond(Outcome::network_error())
      }
    }
  }

  fn transition(&self, lifecycle: Lifecycle) {
    debug!(state = %lifecycle, "Lifecycle transition");
    self.with_state(|s| s.lifecycle = lifecycle);
  }

  fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
    let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut state)
  }
}
