//! Shared HTTP client construction for the networked phases.

use std::time::Duration;

use reqwest::Client;

/// Connect timeout applied to every client.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Identifying User-Agent. Contact email goes in query parameters, not here.
pub(crate) fn user_agent() -> String {
    format!("refpipe/{}", env!("CARGO_PKG_VERSION"))
}

/// Builds a client with the shared User-Agent and the configured timeout.
pub(crate) fn build_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent())
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(timeout)
        .build()
}
