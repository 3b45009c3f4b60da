//! Duration strings as they appear in workflow files.
//!
//! Accepted forms: `250ms`, `10s`, `5m`, `1h`, plus a bare integer meaning
//! seconds. Anything else is a validation error at parse time.

use std::time::Duration;
use thiserror::Error;

/// Invalid duration string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid duration '{input}'")]
pub struct DurationParseError {
    pub input: String,
}

/// Parse a workflow duration string.
pub fn parse_duration(raw: &str) -> Result<Duration, DurationParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DurationParseError { input: raw.to_string() });
    }

    let error = || DurationParseError { input: raw.to_string() };

    if let Some(number) = trimmed.strip_suffix("ms") {
        let value: u64 = number.trim().parse().map_err(|_| error())?;
        return Ok(Duration::from_millis(value));
    }

    let last_character = trimmed.chars().last().expect("non-empty");
    if last_character.is_ascii_alphabetic() {
        let number = &trimmed[..trimmed.len() - 1];
        let value: u64 = number.trim().parse().map_err(|_| error())?;
        return match last_character {
            's' | 'S' => Ok(Duration::from_secs(value)),
            'm' | 'M' => Ok(Duration::from_secs(value * 60)),
            'h' | 'H' => Ok(Duration::from_secs(value * 3600)),
            _ => Err(error()),
        };
    }

    let value: u64 = trimmed.parse().map_err(|_| error())?;
    Ok(Duration::from_secs(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_unit() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("42").unwrap(), Duration::from_secs(42));
    }

    #[test]
    fn tolerates_surrounding_whitespace() {
        assert_eq!(parse_duration(" 30s ").unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("fast").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("-5s").is_err());
    }
}
