use reqwest::{
    header::{self, HeaderMap, HeaderValue},
    Client,
};
use std::time::Duration;

const USER_AGENT: &str = concat!("premium-billing/", env!("CARGO_PKG_VERSION"));

/// Shared client for the outbound verification calls. Every request is bounded by `timeout`.
pub fn create_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .build()
}
