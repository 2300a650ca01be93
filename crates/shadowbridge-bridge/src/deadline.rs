use std::time::Duration;

use tonic::metadata::MetadataMap;

/// Metadata key carrying the caller's remaining time budget.
pub const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

/// The `grpc-timeout` value allows at most eight digits.
const MAX_TIMEOUT_DIGITS: usize = 8;

/// Parse a `grpc-timeout` value such as `500m` or `3S`.
///
/// Returns `None` for malformed values; the call then runs without a
/// caller-supplied deadline.
pub fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    if value.len() < 2 || !value.is_ascii() {
        return None;
    }
    let (digits, unit) = value.split_at(value.len() - 1);
    if digits.len() > MAX_TIMEOUT_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u64 = digits.parse().ok()?;

    let duration = match unit {
        "H" => Duration::from_secs(amount.checked_mul(3600)?),
        "M" => Duration::from_secs(amount.checked_mul(60)?),
        "S" => Duration::from_secs(amount),
        "m" => Duration::from_millis(amount),
        "u" => Duration::from_micros(amount),
        "n" => Duration::from_nanos(amount),
        _ => return None,
    };
    Some(duration)
}

/// Caller deadline carried in request metadata, if any.
pub fn from_metadata(metadata: &MetadataMap) -> Option<Duration> {
    metadata
        .get(GRPC_TIMEOUT_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_grpc_timeout)
}

/// The tighter of two optional bounds.
pub fn effective_timeout(caller: Option<Duration>, io: Option<Duration>) -> Option<Duration> {
    match (caller, io) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}
