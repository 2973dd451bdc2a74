use redis::RedisResult;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    /// Parses the URL only; connections are opened per call.
    pub fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    /// Fixed-window counter. Returns true while `key` stays within `limit` hits per window.
    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, window_seconds)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(count <= limit)
    }
}

pub fn login_rate_key(client: &str) -> String {
    format!("ratelimit:login:{}", client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_keys_are_namespaced_per_client() {
        assert_eq!(login_rate_key("10.0.0.7"), "ratelimit:login:10.0.0.7");
    }

    #[test]
    fn invalid_url_is_rejected_without_connecting() {
        assert!(RedisClient::new("not a url").is_err());
        assert!(RedisClient::new("redis://127.0.0.1:6379").is_ok());
    }
}
