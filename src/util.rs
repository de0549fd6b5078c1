use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::error;

static DURATION_COMPONENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)(ms|h|m|s)").expect("duration regex is valid"));

/// Parse a compact duration such as `"30s"`, `"5m"`, `"1h30m"` or `"250ms"`.
///
/// Components must be contiguous and cover the whole (trimmed) input.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let mut total = Duration::ZERO;
    let mut cursor = 0;

    for captures in DURATION_COMPONENT.captures_iter(raw) {
        let whole = captures.get(0)?;
        if whole.start() != cursor {
            return None;
        }
        cursor = whole.end();

        let value: u64 = captures[1].parse().ok()?;
        let component = match &captures[2] {
            "h" => Duration::from_secs(value.checked_mul(3600)?),
            "m" => Duration::from_secs(value.checked_mul(60)?),
            "s" => Duration::from_secs(value),
            "ms" => Duration::from_millis(value),
            _ => return None,
        };
        total = total.checked_add(component)?;
    }

    (cursor == raw.len()).then_some(total)
}

/// Abort the process after logging a broken internal invariant.
///
/// Used for conditions that can only arise from a defect in the monitoring engine itself,
/// never from external input.
pub fn invariant_violation(message: &str) -> ! {
    error!("invariant violation: {message}");
    std::process::abort()
}
