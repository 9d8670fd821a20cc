//! Formatting utilities for CLI output.

/// Bytes per tebibyte.
const TIB: f64 = (1u64 << 40) as f64;

/// Format bytes as tebibytes with four decimals, the unit of the run summary.
///
/// # Examples
///
/// ```
/// use tf_cli_common::format_tib;
///
/// assert_eq!(format_tib(0), "0.0000 TiB");
/// assert_eq!(format_tib(1_099_511_627_776), "1.0000 TiB");
/// ```
pub fn format_tib(bytes: u64) -> String {
    format!("{:.4} TiB", bytes as f64 / TIB)
}

/// Format a large number with commas for readability.
///
/// # Examples
///
/// ```
/// use tf_cli_common::format_number;
///
/// assert_eq!(format_number(0), "0");
/// assert_eq!(format_number(1234567), "1,234,567");
/// ```
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);

    for (count, c) in s.chars().rev().enumerate() {
        if count > 0 && count % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }

    result.chars().rev().collect()
}
