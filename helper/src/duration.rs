use chrono::Duration;

/// Renders a duration the way `kubectl` prints ages: `42s`, `7m`, `3h`,
/// `12d`, `2y`.
pub fn short_human(duration: Duration) -> String {
    let seconds = duration.num_seconds();
    if seconds < -1 {
        return "<invalid>".to_string();
    }
    if seconds < 0 {
        return "0s".to_string();
    }
    if seconds < 60 {
        return format!("{seconds}s");
    }
    let minutes = duration.num_minutes();
    if minutes < 60 {
        return format!("{minutes}m");
    }
    let hours = duration.num_hours();
    if hours < 24 {
        return format!("{hours}h");
    }
    if hours < 24 * 365 {
        return format!("{}d", hours / 24);
    }
    format!("{}y", hours / 24 / 365)
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        negative = {-10, "<invalid>"},
        almost_now = {-1, "0s"},
        seconds = {42, "42s"},
        minutes = {7 * 60 + 5, "7m"},
        hours = {3 * 3600, "3h"},
        days = {12 * 24 * 3600, "12d"},
        years = {2 * 365 * 24 * 3600 + 10, "2y"}
    )]
    fn test_short_human(seconds: i64, expected: &str) {
        assert_eq!(short_human(Duration::seconds(seconds)), expected);
    }
}
