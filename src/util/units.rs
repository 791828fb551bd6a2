//! Units formatting and conversion utilities
//!
//! Provides functions for human-readable formatting of sizes, durations
//! and throughput.

use std::time::Duration;

const MIB: f64 = 1_048_576.0;

/// Convert bytes to MiB
///
/// # Examples
/// ```
/// use chunkbench::util::units::bytes_to_mib;
///
/// assert_eq!(bytes_to_mib(1048576), 1.0);
/// ```
pub fn bytes_to_mib(bytes: u64) -> f64 {
    bytes as f64 / MIB
}

/// Render a byte count in the largest binary unit it reaches
///
/// # Examples
/// ```
/// use chunkbench::util::units::format_bytes;
///
/// assert_eq!(format_bytes(800), "800 B");
/// assert_eq!(format_bytes(800_000_000), "762.9 MiB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const SUFFIXES: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];

    // each binary unit spans ten bits of magnitude
    let exponent = bytes
        .checked_ilog2()
        .map_or(0, |bits| (bits / 10) as usize)
        .min(SUFFIXES.len() - 1);
    match exponent {
        0 => format!("{} B", bytes),
        _ => {
            let scaled = bytes as f64 / (1u64 << (10 * exponent)) as f64;
            format!("{:.1} {}", scaled, SUFFIXES[exponent])
        }
    }
}

/// Render a wall-clock duration for log lines
///
/// Sub-second durations are shown in milliseconds, durations under a minute
/// with centisecond precision, longer ones in whole seconds.
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use chunkbench::util::units::format_duration;
///
/// assert_eq!(format_duration(Duration::from_millis(42_370)), "42.37s");
/// assert_eq!(format_duration(Duration::from_secs(754)), "12m 34s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let millis = duration.subsec_millis();
    let (hours, minutes, seconds) = (secs / 3600, secs / 60 % 60, secs % 60);

    match (hours, minutes, seconds, millis) {
        (0, 0, 0, ms) => format!("{}ms", ms),
        (0, 0, s, 0) => format!("{}s", s),
        (0, 0, s, ms) => format!("{}.{:02}s", s, ms / 10),
        (0, m, s, _) => format!("{}m {}s", m, s),
        (h, m, s, _) => format!("{}h {}m {}s", h, m, s),
    }
}

/// Calculate throughput in MiB/s from bytes and seconds
///
/// # Examples
/// ```
/// use chunkbench::util::units::calculate_throughput_mbps;
///
/// let throughput = calculate_throughput_mbps(1048576, 1.0);
/// assert!((throughput - 1.0).abs() < 0.01);
/// ```
pub fn calculate_throughput_mbps(bytes: u64, secs: f64) -> f64 {
    if secs.is_nan() || secs <= 0.0 {
        return 0.0;
    }
    bytes_to_mib(bytes) / secs
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_bytes_to_mib() {
        assert_eq!(bytes_to_mib(0), 0.0);
        assert_eq!(bytes_to_mib(524_288), 0.5);
        assert_eq!(bytes_to_mib(800_000_000), 800_000_000.0 / 1_048_576.0);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1024), "1.0 KiB");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(1048576), "1.0 MiB");
        assert_eq!(format_bytes(1073741824), "1.0 GiB");
        assert_eq!(format_bytes(1099511627776), "1.0 TiB");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(u64::MAX), "16384.0 PiB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h 1m 1s");
        assert_eq!(format_duration(Duration::from_millis(61_250)), "1m 1s");
        assert_eq!(format_duration(Duration::from_millis(2_005)), "2.00s");
        assert_eq!(format_duration(Duration::from_secs(7200)), "2h 0m 0s");
    }

    #[test]
    fn test_calculate_throughput_mbps() {
        let throughput = calculate_throughput_mbps(2097152, 2.0);
        assert!((throughput - 1.0).abs() < 0.01);
        assert_eq!(calculate_throughput_mbps(1000, 0.0), 0.0);
        assert_eq!(calculate_throughput_mbps(1000, f64::NAN), 0.0);
    }
}
