use std::time::{Duration, SystemTime};

use chrono::NaiveDateTime;

/// Parse the timestamp of a `MDTM` reply, e.g. `20240102030405` or
/// `20240102030405.123`.
///
/// RFC 3659 timestamps are always UTC. Return `None` if `text` does not
/// contain one.
pub fn parse_modification_time(text: &str) -> Option<SystemTime> {
    let token = text
        .split_whitespace()
        .find(|token| token.len() >= 14 && token.as_bytes()[..14].iter().all(u8::is_ascii_digit))?;

    let (base, fraction) = match token.split_once('.') {
        Some((base, fraction)) => (base, fraction),
        None => (token, ""),
    };

    let naive = NaiveDateTime::parse_from_str(base, "%Y%m%d%H%M%S").ok()?;
    let system_time = SystemTime::from(naive.and_utc());

    if fraction.is_empty() {
        return Some(system_time);
    }
    if !fraction.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }

    // Keep at most nanosecond precision.
    let digits = &fraction[..fraction.len().min(9)];
    let nanos: u64 = format!("{digits:0<9}").parse().ok()?;

    Some(system_time + Duration::from_nanos(nanos))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::UNIX_EPOCH;

    #[test]
    fn whole_seconds() {
        let time = parse_modification_time("20240102030405").unwrap();

        assert_eq!(
            time.duration_since(UNIX_EPOCH).unwrap(),
            Duration::from_secs(1_704_164_645)
        );
    }

    #[test]
    fn fractional_seconds() {
        let time = parse_modification_time("20240102030405.25").unwrap();

        assert_eq!(
            time.duration_since(UNIX_EPOCH).unwrap(),
            Duration::from_millis(1_704_164_645_250)
        );
    }

    #[test]
    fn reply_text_with_prefix() {
        assert!(parse_modification_time("Modified 19700101000001").is_some());
        assert!(parse_modification_time("no timestamp").is_none());
        assert!(parse_modification_time("20241399000000").is_none());
    }
}
