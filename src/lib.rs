//! Offline request-interception cache for a web app shell.
//!
//! Every outgoing request from the app is offered to a [`Dispatcher`], which
//! picks a strategy and answers from the network, a cache generation, or a
//! fallback:
//! - API calls: network-first, empty JSON when offline
//! - Navigations: network-first, cached app shell when offline
//! - Same-origin and CDN assets: cache-first
//! - Everything else: network, cache if offline
//!
//! Install pre-populates the static generation; activate deletes the
//! generations of earlier versions.

pub mod cache;
pub mod classify;
pub mod config;
pub mod generation;
pub mod http;
pub mod logging;
pub mod strategy;
pub mod worker;

#[cfg(test)]
mod testing;

pub use classify::Route;
pub use config::{Config, Settings};
pub use worker::{Dispatcher, Intercept, Lifecycle};
