//! Calendar conversion for ASN.1 UTCTime / GeneralizedTime.

use pssl_types::CryptoError;

/// Convert a date-time to a UNIX timestamp (seconds since 1970-01-01 00:00:00 UTC).
pub fn datetime_to_unix(
    year: u32,
    month: u32,
    day: u32,
    hour: u32,
    min: u32,
    sec: u32,
) -> Result<i64, CryptoError> {
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) || hour > 23 || min > 59 || sec > 60
    {
        return Err(CryptoError::DecodeAsn1Fail);
    }
    let y = if month <= 2 { year - 1 } else { year } as i64;
    let m = if month <= 2 { month + 9 } else { month - 3 } as i64;
    let days = 365 * y + y / 4 - y / 100 + y / 400 + (m * 306 + 5) / 10 + (day as i64 - 1)
        - 719468;
    Ok(days * 86400 + hour as i64 * 3600 + min as i64 * 60 + sec as i64)
}

/// Convert a UNIX timestamp to (year, month, day, hour, minute, second).
pub fn unix_to_datetime(ts: i64) -> (u32, u32, u32, u32, u32, u32) {
    let days = ts.div_euclid(86400);
    let secs = ts.rem_euclid(86400);
    // Civil-from-days (Howard Hinnant)
    let z = days + 719468;
    let era = z.div_euclid(146097);
    let doe = z - era * 146097;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + if month <= 2 { 1 } else { 0 };
    (
        year as u32,
        month as u32,
        day as u32,
        (secs / 3600) as u32,
        ((secs % 3600) / 60) as u32,
        (secs % 60) as u32,
    )
}

fn digits(s: &[u8]) -> Result<u32, CryptoError> {
    let mut v = 0u32;
    for &c in s {
        if !c.is_ascii_digit() {
            return Err(CryptoError::DecodeAsn1Fail);
        }
        v = v * 10 + (c - b'0') as u32;
    }
    Ok(v)
}

/// Parse UTCTime "YYMMDDHHMM[SS]Z". RFC 5280: 00-49 → 20xx, 50-99 → 19xx.
pub(crate) fn parse_utc_time(s: &[u8]) -> Result<i64, CryptoError> {
    let s = s.strip_suffix(b"Z").unwrap_or(s);
    if s.len() != 10 && s.len() != 12 {
        return Err(CryptoError::DecodeAsn1Fail);
    }
    let yy = digits(&s[0..2])?;
    let year = if yy < 50 { 2000 + yy } else { 1900 + yy };
    let sec = if s.len() == 12 { digits(&s[10..12])? } else { 0 };
    datetime_to_unix(
        year,
        digits(&s[2..4])?,
        digits(&s[4..6])?,
        digits(&s[6..8])?,
        digits(&s[8..10])?,
        sec,
    )
}

/// Parse GeneralizedTime "YYYYMMDDHHMMSS[.fff]Z".
pub(crate) fn parse_generalized_time(s: &[u8]) -> Result<i64, CryptoError> {
    let s = s.strip_suffix(b"Z").unwrap_or(s);
    if s.len() < 14 {
        return Err(CryptoError::DecodeAsn1Fail);
    }
    datetime_to_unix(
        digits(&s[0..4])?,
        digits(&s[4..6])?,
        digits(&s[6..8])?,
        digits(&s[8..10])?,
        digits(&s[10..12])?,
        digits(&s[12..14])?,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch() {
        assert_eq!(datetime_to_unix(1970, 1, 1, 0, 0, 0).unwrap(), 0);
        assert_eq!(unix_to_datetime(0), (1970, 1, 1, 0, 0, 0));
    }

    #[test]
    fn test_known_date_both_ways() {
        assert_eq!(datetime_to_unix(2000, 1, 1, 0, 0, 0).unwrap(), 946684800);
        assert_eq!(unix_to_datetime(946684800), (2000, 1, 1, 0, 0, 0));
        let ts = datetime_to_unix(2024, 2, 29, 23, 59, 58).unwrap();
        assert_eq!(unix_to_datetime(ts), (2024, 2, 29, 23, 59, 58));
    }

    #[test]
    fn test_utc_time_century_window() {
        let t49 = parse_utc_time(b"491231235959Z").unwrap();
        let t50 = parse_utc_time(b"500101000000Z").unwrap();
        assert!(t49 > t50);
        assert_eq!(unix_to_datetime(t50).0, 1950);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(parse_utc_time(b"ab0101000000Z").is_err());
        assert!(parse_utc_time(b"2401").is_err());
        assert!(parse_generalized_time(b"20241301000000Z").is_err());
    }
}
