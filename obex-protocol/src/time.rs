//! Time header values.
//!
//! The Time header carries an ISO 8601 basic-format string,
//! `YYYYMMDDTHHMMSS` for local time or `YYYYMMDDTHHMMSSZ` for UTC.

use chrono::{DateTime, NaiveDateTime, Utc};

const LOCAL_TIME_FORMAT: &str = "%Y%m%dT%H%M%S";
const UTC_SUFFIX: char = 'Z';

/// A decoded Time header value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderTime {
    /// A UTC timestamp (string ended with `Z`).
    Utc(DateTime<Utc>),
    /// A local, zone-less timestamp.
    Local(NaiveDateTime),
    /// The header was empty or did not parse.
    Invalid,
}

impl HeaderTime {
    pub fn is_valid(&self) -> bool {
        !matches!(self, HeaderTime::Invalid)
    }

    /// Parses a Time header string. Unparseable or empty input yields
    /// [`HeaderTime::Invalid`].
    pub fn parse(s: &str) -> Self {
        if s.is_empty() {
            return HeaderTime::Invalid;
        }
        match s.strip_suffix(UTC_SUFFIX) {
            Some(stripped) => match NaiveDateTime::parse_from_str(stripped, LOCAL_TIME_FORMAT) {
                Ok(naive) => HeaderTime::Utc(naive.and_utc()),
                Err(_) => HeaderTime::Invalid,
            },
            None => match NaiveDateTime::parse_from_str(s, LOCAL_TIME_FORMAT) {
                Ok(naive) => HeaderTime::Local(naive),
                Err(_) => HeaderTime::Invalid,
            },
        }
    }

    /// Formats the value for the wire. Invalid values format as an empty
    /// string.
    pub fn format(&self) -> String {
        match self {
            HeaderTime::Utc(dt) => {
                format!("{}{}", dt.naive_utc().format(LOCAL_TIME_FORMAT), UTC_SUFFIX)
            }
            HeaderTime::Local(naive) => naive.format(LOCAL_TIME_FORMAT).to_string(),
            HeaderTime::Invalid => String::new(),
        }
    }
}

impl From<DateTime<Utc>> for HeaderTime {
    fn from(dt: DateTime<Utc>) -> Self {
        HeaderTime::Utc(dt)
    }
}

impl From<NaiveDateTime> for HeaderTime {
    fn from(naive: NaiveDateTime) -> Self {
        HeaderTime::Local(naive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2008, 3, 14)
            .unwrap()
            .and_hms_opt(15, 9, 26)
            .unwrap()
    }

    #[test]
    fn test_parse_local() {
        assert_eq!(
            HeaderTime::parse("20080314T150926"),
            HeaderTime::Local(sample())
        );
    }

    #[test]
    fn test_parse_utc() {
        assert_eq!(
            HeaderTime::parse("20080314T150926Z"),
            HeaderTime::Utc(sample().and_utc())
        );
    }

    #[test]
    fn test_invalid_inputs() {
        assert_eq!(HeaderTime::parse(""), HeaderTime::Invalid);
        assert_eq!(HeaderTime::parse("Z"), HeaderTime::Invalid);
        assert_eq!(HeaderTime::parse("2008-03-14 15:09:26"), HeaderTime::Invalid);
        assert_eq!(HeaderTime::parse("20081314T150926"), HeaderTime::Invalid);
        assert!(!HeaderTime::Invalid.is_valid());
    }

    #[test]
    fn test_format_roundtrip() {
        let local = HeaderTime::Local(sample());
        assert_eq!(local.format(), "20080314T150926");
        assert_eq!(HeaderTime::parse(&local.format()), local);

        let utc = HeaderTime::Utc(sample().and_utc());
        assert_eq!(utc.format(), "20080314T150926Z");
        assert_eq!(HeaderTime::parse(&utc.format()), utc);

        assert_eq!(HeaderTime::Invalid.format(), "");
    }
}
