use std::time::Duration;

pub(crate) const USER_AGENT: &str = concat!("casebook/", env!("CARGO_PKG_VERSION"));

/// Blocking client shared by the previous-state fetch and the webhook.
pub(crate) fn client() -> Result<reqwest::blocking::Client, reqwest::Error> {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent(USER_AGENT)
        .build()
}
