use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use tourdesk_store::redis_repo::login_rate_key;

use crate::error::AppError;
use crate::state::AppState;

const LOGIN_WINDOW_SECONDS: i64 = 60;

/// Peer address when the server was started with connect info, else the first
/// `X-Forwarded-For` hop.
fn client_id(headers: &HeaderMap, peer: Option<&ConnectInfo<SocketAddr>>) -> String {
    if let Some(ConnectInfo(addr)) = peer {
        return addr.ip().to_string();
    }
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn login_rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Result<Response, AppError> {
    let client = client_id(req.headers(), req.extensions().get::<ConnectInfo<SocketAddr>>());
    let key = login_rate_key(&client);

    match state
        .redis
        .check_rate_limit(&key, state.auth.login_attempts_per_minute, LOGIN_WINDOW_SECONDS)
        .await
    {
        Ok(true) => Ok(next.run(req).await),
        Ok(false) => {
            tracing::warn!("Login rate limit hit for {}", client);
            Err(AppError::RateLimited)
        }
        Err(e) => {
            // Fail open
            tracing::warn!("Rate limiter unavailable: {}", e);
            Ok(next.run(req).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_address_wins_over_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());

        assert_eq!(client_id(&headers, None), "203.0.113.9");

        let peer = ConnectInfo(SocketAddr::from(([192, 0, 2, 7], 4242)));
        assert_eq!(client_id(&headers, Some(&peer)), "192.0.2.7");

        assert_eq!(client_id(&HeaderMap::new(), None), "unknown");
    }
}
