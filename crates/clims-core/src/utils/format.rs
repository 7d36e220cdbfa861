use chrono::NaiveDate;

/// Truncate to at most `max_len` characters, adding an ellipsis if cut
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Format an optional string, returning a default if None or blank
pub fn format_optional(value: Option<&str>, default: &str) -> String {
    value
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
        .to_string()
}

/// "Mar 01, 2025", or "-" when absent
pub fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%b %d, %Y").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Human-readable size for downloaded exports
pub fn format_bytes(bytes: usize) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{} B", bytes)
    } else if b < KB * KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{:.1} MB", b / (KB * KB))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("Latitude", 20), "Latitude");
        assert_eq!(truncate("Latitude 7440 Rugged", 10), "Latitud...");
        assert_eq!(truncate("Écran incurvé", 5), "Éc...");
        assert_eq!(truncate("abcdef", 2), "ab");
    }

    #[test]
    fn test_format_optional() {
        assert_eq!(format_optional(Some("HQ"), "-"), "HQ");
        assert_eq!(format_optional(Some("  "), "-"), "-");
        assert_eq!(format_optional(None, "unassigned"), "unassigned");
    }

    #[test]
    fn test_format_date_and_bytes() {
        assert_eq!(format_date(NaiveDate::from_ymd_opt(2025, 3, 1)), "Mar 01, 2025");
        assert_eq!(format_date(None), "-");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
