mod client;
mod types;

pub use client::{Fetcher, ReqwestFetcher};
pub use types::{FetchCache, Request, RequestIdentity, RequestMode, Response, ResponseType};
