use std::time::{SystemTime, UNIX_EPOCH};

const TRAFFIC_UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

/// Human readable byte quantity with two decimals, e.g. `1.50GB`.
pub fn format_traffic(bytes: i64) -> String {
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < TRAFFIC_UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.2}{}", size, TRAFFIC_UNITS[unit])
}

/// Current Unix time in seconds.
pub fn unix_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Current Unix time in milliseconds.
pub fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
