use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

/// A database value, used both for binding statement parameters and as the
/// cell representation of query results.
///
/// The same enum is shared by every backend so callers never branch on
/// driver types:
/// ```rust
/// use sql_pool::SqlValue;
///
/// let params = vec![
///     SqlValue::Text("alice".into()),
///     SqlValue::LLong(42),
///     SqlValue::Null,
/// ];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL
    Null,
    /// 32-bit integer
    Int(i32),
    /// 64-bit integer
    LLong(i64),
    /// 64-bit float
    Double(f64),
    /// Text value
    Text(String),
    /// Binary data
    Blob(Vec<u8>),
    /// Unix timestamp, seconds since the epoch in UTC
    Timestamp(i64),
}

impl SqlValue {
    /// Check if this value is SQL NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Coerce to a 64-bit integer.
    ///
    /// Text is parsed base-10; SQL NULL yields 0. Anything that cannot be
    /// read as an integer is reported with a description of the offending
    /// value.
    pub(crate) fn to_llong(&self) -> Result<i64, String> {
        match self {
            SqlValue::Null => Ok(0),
            SqlValue::Int(i) => Ok(i64::from(*i)),
            SqlValue::LLong(i) | SqlValue::Timestamp(i) => Ok(*i),
            SqlValue::Double(d) => Ok(*d as i64),
            SqlValue::Text(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| format!("'{s}' is not a number")),
            SqlValue::Blob(_) => Err("blob value cannot be converted to a number".to_string()),
        }
    }

    pub(crate) fn to_int(&self) -> Result<i32, String> {
        let v = self.to_llong()?;
        i32::try_from(v).map_err(|_| format!("value {v} is out of int range"))
    }

    /// Coerce to a double. Same rules as the integer coercions.
    pub(crate) fn to_double(&self) -> Result<f64, String> {
        match self {
            SqlValue::Null => Ok(0.0),
            SqlValue::Int(i) => Ok(f64::from(*i)),
            SqlValue::LLong(i) | SqlValue::Timestamp(i) => Ok(*i as f64),
            SqlValue::Double(d) => Ok(*d),
            SqlValue::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| format!("'{s}' is not a number")),
            SqlValue::Blob(_) => Err("blob value cannot be converted to a number".to_string()),
        }
    }

    /// Coerce to a string. Succeeds for every non-null value; returns `None`
    /// for SQL NULL.
    pub(crate) fn to_text(&self) -> Option<String> {
        match self {
            SqlValue::Null => None,
            SqlValue::Int(i) => Some(i.to_string()),
            SqlValue::LLong(i) | SqlValue::Timestamp(i) => Some(i.to_string()),
            SqlValue::Double(d) => Some(d.to_string()),
            SqlValue::Text(s) => Some(s.clone()),
            SqlValue::Blob(b) => Some(String::from_utf8_lossy(b).into_owned()),
        }
    }

    /// Borrow the raw bytes of a text or blob value.
    pub(crate) fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            SqlValue::Text(s) => Some(s.as_bytes()),
            SqlValue::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// Coerce to a Unix timestamp in UTC seconds.
    ///
    /// Numeric values pass through as-is; text is interpreted as either an
    /// integer Unix time or an ISO 8601 date/time string. SQL NULL yields 0.
    pub(crate) fn to_timestamp(&self) -> Result<i64, String> {
        match self {
            SqlValue::Null => Ok(0),
            SqlValue::Int(i) => Ok(i64::from(*i)),
            SqlValue::LLong(i) | SqlValue::Timestamp(i) => Ok(*i),
            SqlValue::Double(d) => Ok(*d as i64),
            SqlValue::Text(s) => {
                let t = s.trim();
                if let Ok(secs) = t.parse::<i64>() {
                    return Ok(secs);
                }
                let dt = parse_iso8601(t)?;
                Ok(dt.epoch())
            }
            SqlValue::Blob(_) => Err("blob value cannot be converted to a timestamp".to_string()),
        }
    }

    /// Coerce to a broken-down [`SqlDateTime`].
    pub(crate) fn to_datetime(&self) -> Result<SqlDateTime, String> {
        match self {
            SqlValue::Null => Ok(SqlDateTime::default()),
            SqlValue::Int(i) => Ok(SqlDateTime::from_unix(i64::from(*i))),
            SqlValue::LLong(i) | SqlValue::Timestamp(i) => Ok(SqlDateTime::from_unix(*i)),
            SqlValue::Double(d) => Ok(SqlDateTime::from_unix(*d as i64)),
            SqlValue::Text(s) => {
                let t = s.trim();
                if let Ok(secs) = t.parse::<i64>() {
                    return Ok(SqlDateTime::from_unix(secs));
                }
                parse_iso8601(t)
            }
            SqlValue::Blob(_) => Err("blob value cannot be converted to a date/time".to_string()),
        }
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::LLong(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Double(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Blob(v)
    }
}

impl From<&[u8]> for SqlValue {
    fn from(v: &[u8]) -> Self {
        SqlValue::Blob(v.to_vec())
    }
}

/// A broken-down calendar date and time.
///
/// Field conventions follow `mktime(3)` with one exception: `year` holds
/// the literal year, not years since 1900. `month` is 0..=11, `second`
/// allows a leap second (0..=60), and `gmt_offset` holds the offset from
/// UTC in seconds when the source value carried a timezone, 0 otherwise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SqlDateTime {
    /// Literal year, e.g. 2024
    pub year: i32,
    /// Months since January, 0..=11
    pub month: u32,
    /// Day of the month, 1..=31 (0 when absent)
    pub day: u32,
    /// Hours since midnight, 0..=23
    pub hour: u32,
    /// Minutes after the hour, 0..=59
    pub minute: u32,
    /// Seconds after the minute, 0..=60
    pub second: u32,
    /// Offset from UTC in seconds when the value carried a timezone
    pub gmt_offset: i32,
}

impl SqlDateTime {
    /// Broken-down UTC representation of a Unix timestamp.
    #[must_use]
    pub fn from_unix(secs: i64) -> Self {
        let dt = DateTime::from_timestamp(secs, 0).unwrap_or_default();
        Self {
            year: dt.year(),
            month: dt.month0(),
            day: dt.day(),
            hour: dt.hour(),
            minute: dt.minute(),
            second: dt.second(),
            gmt_offset: 0,
        }
    }

    /// Unix timestamp of this value, honoring `gmt_offset`.
    #[must_use]
    pub fn epoch(&self) -> i64 {
        let date = NaiveDate::from_ymd_opt(self.year, self.month + 1, self.day.max(1));
        let time = NaiveTime::from_hms_opt(self.hour, self.minute, self.second.min(59));
        match (date, time) {
            (Some(d), Some(t)) => d.and_time(t).and_utc().timestamp() - i64::from(self.gmt_offset),
            _ => 0,
        }
    }
}

/// Parse an ISO 8601 date, time, or date-time string, with or without a
/// timezone designator.
pub(crate) fn parse_iso8601(s: &str) -> Result<SqlDateTime, String> {
    // Full date-time with timezone, e.g. 2024-01-30T22:04:00+01:00
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        let naive = dt.naive_local();
        return Ok(from_naive(naive, dt.offset().local_minus_utc()));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(from_naive(dt, 0));
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(SqlDateTime {
            year: d.year(),
            month: d.month0(),
            day: d.day(),
            ..SqlDateTime::default()
        });
    }
    if let Ok(t) = NaiveTime::parse_from_str(s, "%H:%M:%S") {
        return Ok(SqlDateTime {
            hour: t.hour(),
            minute: t.minute(),
            second: t.second(),
            ..SqlDateTime::default()
        });
    }
    Err(format!("'{s}' is not a valid date or time"))
}

fn from_naive(dt: NaiveDateTime, gmt_offset: i32) -> SqlDateTime {
    SqlDateTime {
        year: dt.year(),
        month: dt.month0(),
        day: dt.day(),
        hour: dt.hour(),
        minute: dt.minute(),
        second: dt.second(),
        gmt_offset,
    }
}
