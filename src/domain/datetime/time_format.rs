use crate::error::{Error, Result};

/// Parses a wall-clock time in `HH:MM` notation (24h range).
pub fn parse_hh_mm(value: &str) -> Result<(u32, u32)> {
    let bytes = value.as_bytes();
    if bytes.len() != 5 || bytes[2] != b':' {
        return Err(Error::InvalidTimeFormat(value.to_string()));
    }

    let hours: u32 = value[..2].parse().map_err(|_| Error::InvalidTimeFormat(value.to_string()))?;
    let minutes: u32 = value[3..].parse().map_err(|_| Error::InvalidTimeFormat(value.to_string()))?;

    if hours > 23 || minutes > 59 {
        return Err(Error::InvalidTimeFormat(value.to_string()));
    }

    Ok((hours, minutes))
}

/// Parses the compact `HHMM` notation used in the calendar's data attributes.
pub fn parse_compact(value: &str) -> Result<(u32, u32)> {
    if value.len() != 4 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidTimeFormat(value.to_string()));
    }

    let hours: u32 = value[..2].parse().map_err(|_| Error::InvalidTimeFormat(value.to_string()))?;
    let minutes: u32 = value[2..].parse().map_err(|_| Error::InvalidTimeFormat(value.to_string()))?;

    if hours > 23 || minutes > 59 {
        return Err(Error::InvalidTimeFormat(value.to_string()));
    }

    Ok((hours, minutes))
}

/// `"14:00"` -> `"1400"`.
pub fn to_compact(value: &str) -> Result<String> {
    let (hours, minutes) = parse_hh_mm(value)?;
    Ok(format!("{:02}{:02}", hours, minutes))
}

/// Accepts either notation and normalizes to `"HH:MM"`.
pub fn to_colon(value: &str) -> Result<String> {
    let (hours, minutes) = if value.contains(':') { parse_hh_mm(value)? } else { parse_compact(value)? };
    Ok(format!("{:02}:{:02}", hours, minutes))
}

/// Minutes since midnight for a `HH:MM` time.
pub fn minutes_of_day(value: &str) -> Result<i32> {
    let (hours, minutes) = parse_hh_mm(value)?;
    Ok((hours * 60 + minutes) as i32)
}

/// Inverse of [`minutes_of_day`]. Caller guarantees `0 <= total < 1440`.
pub fn from_minutes(total: i32) -> String {
    format!("{:02}:{:02}", total / 60, total % 60)
}

/// `value + delta` minutes, or `None` if the result leaves the day.
pub fn checked_add_minutes(value: &str, delta: i32) -> Result<Option<String>> {
    let total = minutes_of_day(value)? + delta;
    if (0..24 * 60).contains(&total) { Ok(Some(from_minutes(total))) } else { Ok(None) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_and_invalid_times() {
        assert_eq!(parse_hh_mm("00:00").unwrap(), (0, 0));
        assert_eq!(parse_hh_mm("23:59").unwrap(), (23, 59));
        assert!(parse_hh_mm("24:00").is_err());
        assert!(parse_hh_mm("12:60").is_err());
        assert!(parse_hh_mm("9:00").is_err());
        assert!(parse_hh_mm("12-30").is_err());
        assert!(parse_hh_mm("ab:cd").is_err());
    }

    #[test]
    fn test_compact_normalization_is_a_bijection() {
        for total in 0..(24 * 60) {
            let colon = from_minutes(total);
            let compact = to_compact(&colon).unwrap();
            assert_eq!(to_colon(&compact).unwrap(), colon);
            assert_eq!(minutes_of_day(&colon).unwrap(), total);
        }
    }

    #[test]
    fn test_to_colon_accepts_both_notations() {
        assert_eq!(to_colon("1400").unwrap(), "14:00");
        assert_eq!(to_colon("14:00").unwrap(), "14:00");
        assert!(to_colon("140").is_err());
        assert!(to_colon("2500").is_err());
    }

    #[test]
    fn test_checked_add_minutes_stays_inside_the_day() {
        assert_eq!(checked_add_minutes("14:00", 30).unwrap(), Some("14:30".to_string()));
        assert_eq!(checked_add_minutes("23:45", 30).unwrap(), None);
        assert_eq!(checked_add_minutes("00:15", -30).unwrap(), None);
    }
}
