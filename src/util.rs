use lambda_http::{Body, Response};
use std::sync::atomic::{AtomicU64, Ordering};
use url::Url;

pub fn valid_target(u: &str) -> bool {
    if let Ok(parsed) = Url::parse(u) {
        match parsed.scheme() {
            "http" | "https" => {}
            _ => return false,
        }
        return parsed.host().is_some();
    }
    false
}

pub fn short_url(domain: &str, code: &str) -> String {
    format!("https://{domain}/{code}")
}

pub fn epoch_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Source of "now" in epoch seconds. Injected so expiry can be tested with
/// simulated time.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        epoch_now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self(AtomicU64::new(start))
    }

    pub fn advance(&self, secs: u64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn resp_json(status: u16, v: serde_json::Value) -> Response<Body> {
    let mut resp = Response::new(Body::Text(v.to_string()));
    *resp.status_mut() = lambda_http::http::StatusCode::from_u16(status)
        .unwrap_or(lambda_http::http::StatusCode::INTERNAL_SERVER_ERROR);
    resp.headers_mut().insert(
        "Content-Type",
        lambda_http::http::HeaderValue::from_static("application/json"),
    );
    resp
}
