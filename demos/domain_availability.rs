//! Domain Availability Example
//!
//! Asks a registrar API whether a domain can be registered, with the call
//! guarded by a breaker named `domains`.
//!
//! ```text
//! DOMAINS_HOST=https://api.ote-godaddy.com \
//! DOMAINS_AUTHORIZATION="sso-key KEY:SECRET" \
//! cargo run --example domain_availability --features http -- example.com
//! ```

use callguard::http::HttpCall;
use callguard::prelude::*;
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Url};
use serde::Deserialize;
use std::env;
use std::error::Error;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct DomainAvailableResponse {
    available: bool,
    currency: String,
    definitive: bool,
    domain: String,
    period: i32,
    price: i32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let domain = env::args().nth(1).unwrap_or_else(|| "example.com".to_string());
    let host = env::var("DOMAINS_HOST").unwrap_or_else(|_| "https://api.ote-godaddy.com".into());
    let authorization = env::var("DOMAINS_AUTHORIZATION").unwrap_or_default();

    let mut url = Url::parse(&host)?.join("/v1/domains/available")?;
    url.query_pairs_mut().append_pair("domain", &domain);

    let call = HttpCall::get(Client::new(), url)
        .header(AUTHORIZATION, HeaderValue::from_str(&authorization)?)
        .header(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let manager = BreakerManager::new();
    manager.register(
        "domains",
        BreakerConfig::builder()
            .overall_timeout(Duration::from_secs(5))
            .sleep_window(Duration::from_secs(5))
            .request_volume_threshold(10)
            .error_threshold_percent(50)
            .max_retry_attempts(3)
            .retry_backoff(Backoff::Fixed(Duration::from_millis(100)))
            .build()?,
    );

    let payload = manager.call("domains", call.into_unit()).await?;
    let answer: DomainAvailableResponse = serde_json::from_slice(&payload)?;

    println!(
        "{}: available={} definitive={} price={} {} for {} year(s)",
        answer.domain,
        answer.available,
        answer.definitive,
        answer.price,
        answer.currency,
        answer.period
    );

    Ok(())
}
