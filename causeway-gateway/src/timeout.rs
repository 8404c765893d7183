//! Deadline propagation from request headers.

use std::time::Duration;

/// Parse a `Grpc-Timeout` header value: 1-8 digits plus a unit letter.
pub fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    if value.len() < 2 || value.len() > 9 {
        return None;
    }
    let (digits, unit) = value.split_at(value.len() - 1);
    let amount: u64 = digits.parse().ok()?;
    Some(match unit {
        "H" => Duration::from_secs(amount.checked_mul(3600)?),
        "M" => Duration::from_secs(amount.checked_mul(60)?),
        "S" => Duration::from_secs(amount),
        "m" => Duration::from_millis(amount),
        "u" => Duration::from_micros(amount),
        "n" => Duration::from_nanos(amount),
        _ => return None,
    })
}

/// Parse a `Connect-Timeout-Ms` header value.
pub fn parse_connect_timeout(value: &str) -> Option<Duration> {
    value.parse::<u64>().ok().map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grpc_units_are_honored() {
        assert_eq!(parse_grpc_timeout("50S"), Some(Duration::from_secs(50)));
        assert_eq!(
            parse_grpc_timeout("50m"),
            Some(Duration::from_millis(50))
        );
        // 50 minutes, not 50 milliseconds.
        assert_eq!(
            parse_grpc_timeout("50M"),
            Some(Duration::from_secs(50 * 60))
        );
        assert_eq!(parse_grpc_timeout("2H"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_grpc_timeout("100u"), Some(Duration::from_micros(100)));
        assert_eq!(parse_grpc_timeout("1n"), Some(Duration::from_nanos(1)));
    }

    #[test]
    fn malformed_grpc_timeouts_are_ignored() {
        assert_eq!(parse_grpc_timeout(""), None);
        assert_eq!(parse_grpc_timeout("S"), None);
        assert_eq!(parse_grpc_timeout("12"), None);
        assert_eq!(parse_grpc_timeout("123456789S"), None);
        assert_eq!(parse_grpc_timeout("-5S"), None);
    }

    #[test]
    fn connect_timeout_is_milliseconds() {
        assert_eq!(
            parse_connect_timeout("250"),
            Some(Duration::from_millis(250))
        );
        assert_eq!(parse_connect_timeout("abc"), None);
    }
}
