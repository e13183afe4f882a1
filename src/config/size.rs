use crate::config::error::{ConfigError, ConfigResult};

/// Parse a byte size such as `10000000`, `10MB`, `500 KiB` or `1.5GB`.
///
/// Decimal suffixes (KB, MB, GB, TB) are powers of 1000, binary ones
/// (KiB, MiB, GiB, TiB) powers of 1024.
pub fn parse_size(input: &str) -> ConfigResult<u64> {
    let trimmed = input.trim().replace('_', "");
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);

    let multiplier: u64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" => 1_000,
        "m" | "mb" => 1_000_000,
        "g" | "gb" => 1_000_000_000,
        "t" | "tb" => 1_000_000_000_000,
        "kib" => 1 << 10,
        "mib" => 1 << 20,
        "gib" => 1 << 30,
        "tib" => 1 << 40,
        _ => return Err(ConfigError::InvalidSize(input.to_string())),
    };

    if number.contains('.') {
        let value: f64 = number
            .parse()
            .map_err(|_| ConfigError::InvalidSize(input.to_string()))?;
        let bytes = (value * multiplier as f64).round();
        // u64::MAX as f64 rounds up to 2^64, which is already out of range
        if !bytes.is_finite() || bytes >= u64::MAX as f64 {
            return Err(ConfigError::InvalidSize(input.to_string()));
        }
        Ok(bytes as u64)
    } else {
        let value: u64 = number
            .parse()
            .map_err(|_| ConfigError::InvalidSize(input.to_string()))?;
        value
            .checked_mul(multiplier)
            .ok_or_else(|| ConfigError::InvalidSize(input.to_string()))
    }
}
