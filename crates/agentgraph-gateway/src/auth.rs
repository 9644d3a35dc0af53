use agentgraph_core::config::GatewayConfig;

/// Check a request's credentials against the gateway config.
///
/// Without a configured token every request passes. With one, the bearer
/// header or the `?token=` query parameter must match it.
pub fn validate_auth(
    config: Option<&GatewayConfig>,
    bearer: Option<&str>,
    query_token: Option<&str>,
) -> bool {
    let Some(expected) = config.and_then(|c| c.token.as_deref()) else {
        return true;
    };
    match bearer {
        Some(given) => given == expected,
        None => query_token == Some(expected),
    }
}

/// Extract token from the query string (?token=...).
pub fn extract_token_from_query(query: &str) -> Option<&str> {
    for pair in query.split('&') {
        if let Some(val) = pair.strip_prefix("token=") {
            return Some(val);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway(token: Option<&str>) -> GatewayConfig {
        GatewayConfig {
            bind: "127.0.0.1:17878".to_string(),
            token: token.map(|s| s.to_string()),
        }
    }

    #[test]
    fn test_no_token_always_passes() {
        assert!(validate_auth(None, None, None));
        let config = gateway(None);
        assert!(validate_auth(Some(&config), None, None));
        assert!(validate_auth(Some(&config), Some("anything"), None));
    }

    #[test]
    fn test_bearer_token() {
        let config = gateway(Some("secret"));
        assert!(!validate_auth(Some(&config), None, None));
        assert!(!validate_auth(Some(&config), Some("wrong"), None));
        assert!(validate_auth(Some(&config), Some("secret"), None));
        // A wrong bearer is not rescued by the query string
        assert!(!validate_auth(Some(&config), Some("wrong"), Some("secret")));
    }

    #[test]
    fn test_query_token() {
        let config = gateway(Some("secret"));
        assert!(validate_auth(Some(&config), None, Some("secret")));
        assert!(!validate_auth(Some(&config), None, Some("nope")));
    }

    #[test]
    fn test_extract_token() {
        assert_eq!(extract_token_from_query("token=abc"), Some("abc"));
        assert_eq!(extract_token_from_query("foo=bar&token=abc"), Some("abc"));
        assert_eq!(extract_token_from_query("foo=bar"), None);
    }
}
