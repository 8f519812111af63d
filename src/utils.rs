use crate::error::{CompressionError, Result};

const SIZE_UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
const SIZE_THRESHOLD: f64 = 1024.0;

/// Format file size in human-readable format
///
/// # Arguments
/// * `bytes` - Size in bytes
///
/// # Returns
/// * Human-readable size string (e.g., "1.2 MB", "512 B")
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= SIZE_THRESHOLD && unit_index < SIZE_UNITS.len() - 1 {
        size /= SIZE_THRESHOLD;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, SIZE_UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, SIZE_UNITS[unit_index])
    }
}

/// Parse a human-readable size such as `40KB`, `1.5 MB`, `512b` or `2048`.
///
/// Units are binary multiples; `K`, `KB` and `KiB` all mean 1024 bytes.
pub fn parse_file_size(input: &str) -> Result<u64> {
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);

    let value: f64 = number
        .parse()
        .map_err(|_| CompressionError::InvalidSize(input.to_string()))?;

    let multiplier: u64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" | "kib" => 1024,
        "m" | "mb" | "mib" => 1024 * 1024,
        "g" | "gb" | "gib" => 1024 * 1024 * 1024,
        _ => return Err(CompressionError::InvalidSize(input.to_string())),
    };

    let bytes = (value * multiplier as f64).round();
    if !bytes.is_finite() {
        return Err(CompressionError::InvalidSize(input.to_string()));
    }
    Ok(bytes as u64)
}

/// Bytes saved, negative when the output grew
pub fn calculate_savings(original_size: u64, optimized_size: u64) -> i64 {
    original_size as i64 - optimized_size as i64
}

/// Savings as a percentage of the original size, rounded to two decimals
pub fn calculate_savings_percent(original_size: u64, optimized_size: u64) -> f64 {
    if original_size == 0 {
        return 0.0;
    }
    let percent = calculate_savings(original_size, optimized_size) as f64 / original_size as f64 * 100.0;
    (percent * 100.0).round() / 100.0
}
