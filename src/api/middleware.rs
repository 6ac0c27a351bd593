//! Bearer-token auth and per-client rate limiting for the REST API.
//!
//! - `GRANTED_API_KEY` - Require `Authorization: Bearer <key>`; also turns on rate limiting
//! - `GRANTED_CORS_ORIGINS` - Comma-separated allow-list (default: any origin)
//! - `GRANTED_RATE_LIMIT` - Requests per client per minute (default: 100)

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::{
    collections::{HashMap, VecDeque},
    net::{IpAddr, Ipv4Addr},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

const DEFAULT_REQUESTS_PER_MINUTE: u32 = 100;
const RATE_WINDOW: Duration = Duration::from_secs(60);

#[derive(Clone, Debug, Default)]
pub struct SecurityConfig {
    pub api_key: Option<String>,
    /// `None` allows any origin.
    pub cors_origins: Option<Vec<String>>,
    pub rate_limiter: Option<RateLimiter>,
}

impl SecurityConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_key = var("GRANTED_API_KEY");
        let cors_origins = var("GRANTED_CORS_ORIGINS").map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(String::from)
                .collect()
        });

        // Local single-user runs stay unthrottled
        let rate_limiter = api_key.as_ref().map(|_| {
            let per_minute = var("GRANTED_RATE_LIMIT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_REQUESTS_PER_MINUTE);
            RateLimiter::per_minute(per_minute)
        });

        Self {
            api_key,
            cors_origins,
            rate_limiter,
        }
    }

    /// Open access: no key, any origin, no throttling.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn with_api_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
            ..Self::default()
        }
    }

    pub fn with_rate_limit(per_minute: u32) -> Self {
        Self {
            rate_limiter: Some(RateLimiter::per_minute(per_minute)),
            ..Self::default()
        }
    }
}

/// Sliding-window request counter per client address.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    clients: Arc<Mutex<HashMap<IpAddr, VecDeque<Instant>>>>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit: limit as usize,
            window,
            clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, RATE_WINDOW)
    }

    /// Count a request from `client`. False once it has used up the window.
    pub fn allow(&self, client: IpAddr) -> bool {
        let now = Instant::now();
        let mut clients = self.clients.lock().expect("rate limiter lock poisoned");
        let seen = clients.entry(client).or_default();

        while seen
            .front()
            .is_some_and(|at| now.duration_since(*at) >= self.window)
        {
            seen.pop_front();
        }
        if seen.len() >= self.limit {
            return false;
        }
        seen.push_back(now);
        true
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, &'static str> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or("missing Authorization header")?;
    value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or("Authorization is not a bearer token")
}

pub async fn require_api_key(
    State(config): State<SecurityConfig>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = config.api_key.as_deref() else {
        return Ok(next.run(request).await);
    };

    match bearer_token(request.headers()) {
        Ok(token) if token == expected => Ok(next.run(request).await),
        Ok(_) => {
            tracing::warn!(path = %request.uri().path(), "Rejected request with a wrong API key");
            Err(StatusCode::UNAUTHORIZED)
        }
        Err(reason) => {
            tracing::warn!(path = %request.uri().path(), reason, "Rejected unauthenticated request");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

pub async fn throttle(
    State(limiter): State<RateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let client = client_ip(request.headers());
    if !limiter.allow(client) {
        tracing::warn!(%client, "Rate limit exceeded");
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }
    Ok(next.run(request).await)
}

/// First `X-Forwarded-For` hop, then `X-Real-IP`, else loopback.
fn client_ip(headers: &HeaderMap) -> IpAddr {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let parse = |value: Option<&str>| value.and_then(|ip| ip.trim().parse::<IpAddr>().ok());

    parse(header("x-forwarded-for").and_then(|hops| hops.split(',').next()))
        .or_else(|| parse(header("x-real-ip")))
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}
