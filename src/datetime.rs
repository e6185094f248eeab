use chrono::{DateTime, FixedOffset, SecondsFormat, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Record timestamp, always kept in UTC with millisecond precision.
///
/// Stored as RFC 3339 text with a fixed number of fraction digits, so that
/// ordering the TEXT column is the same as ordering by time.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy)]
pub struct Timestamp(pub DateTime<FixedOffset>);
impl Timestamp {
    pub fn now() -> Self {
        Self::from_fixed_offset(Utc::now().fixed_offset())
    }
    pub fn from_fixed_offset(datetime: DateTime<FixedOffset>) -> Timestamp {
        let datetime = datetime.with_timezone(&Utc).fixed_offset();
        let millis = datetime.timestamp_subsec_millis();
        let nanos = datetime.timestamp_subsec_nanos() - millis * 1_000_000;
        if let Some(dt) = datetime.checked_sub_signed(TimeDelta::nanoseconds(nanos as i64)) {
            Timestamp(dt)
        } else {
            Timestamp(datetime)
        }
    }
    pub fn to_display_string(self) -> String {
        self.0.format("%F %T").to_string()
    }
    pub fn to_date_string(self) -> String {
        self.0.format("%F").to_string()
    }
    pub fn to_iso_string(self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
    pub fn from_iso_string(datetime_str: &str) -> Result<Self, anyhow::Error> {
        let dt = DateTime::parse_from_rfc3339(datetime_str)?;
        Ok(Self::from_fixed_offset(dt))
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_iso_string())
    }
}
impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Timestamp::from_iso_string(&s).map_err(serde::de::Error::custom)
    }
}

impl From<DateTime<FixedOffset>> for Timestamp {
    fn from(value: DateTime<FixedOffset>) -> Self {
        Self::from_fixed_offset(value)
    }
}
impl<DB: sqlx::Database> sqlx::Type<DB> for Timestamp
where
    str: sqlx::Type<DB>,
{
    fn type_info() -> <DB as sqlx::Database>::TypeInfo {
        // TEXT columns only
        <&str as sqlx::Type<DB>>::type_info()
    }
}
impl<'q, DB: sqlx::Database> sqlx::Encode<'q, DB> for Timestamp
where
    String: sqlx::Encode<'q, DB>,
{
    fn encode_by_ref(&self, buf: &mut <DB as sqlx::Database>::ArgumentBuffer<'q>) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<'q, DB>>::encode(self.to_iso_string(), buf)
    }
}
impl<'r, DB: sqlx::Database> sqlx::Decode<'r, DB> for Timestamp
where
    &'r str: sqlx::Decode<'r, DB>,
{
    fn decode(value: <DB as sqlx::Database>::ValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let value = <&str as sqlx::Decode<DB>>::decode(value)?;
        Ok(Timestamp::from_iso_string(value)?)
    }
}

pub(crate) fn dtstr(iso_date_str: Option<&str>) -> String {
    let Some(s) = iso_date_str else {
        return "---".to_string()
    };
    if let Ok(dt) = Timestamp::from_iso_string(s) {
        dt.to_display_string()
    } else {
        s.to_string()
    }
}

#[test]
fn test_now_is_utc_millis() {
    let ts = Timestamp::now();
    assert_eq!(ts.0.offset().local_minus_utc(), 0);
    assert_eq!(ts.0.timestamp_subsec_nanos() % 1_000_000, 0);
}

#[test]
fn test_parse_timestamp() {
    for (dtstr, dtstr2) in &[
        ("1970-03-05T14:32:45+00:00", "1970-03-05T14:32:45.000Z"),
        ("2025-03-05T14:32:45Z", "2025-03-05T14:32:45.000Z"),
        ("2025-03-05T14:32:45+10:00", "2025-03-05T04:32:45.000Z"),
        ("2025-03-05T14:32:45-01:30", "2025-03-05T16:02:45.000Z"),
        ("2025-03-17T20:45:38.565293063+01:00", "2025-03-17T19:45:38.565Z"),
    ] {
        let dt = Timestamp::from_iso_string(dtstr)
            .map_err(|e| println!("parse {dtstr} error: {e}")).unwrap();
        assert_eq!(&dt.to_iso_string(), dtstr2)
    }
}

#[test]
fn test_iso_text_order_is_time_order() {
    let a = Timestamp::from_iso_string("2025-03-05T14:32:45Z").unwrap();
    let b = Timestamp::from_iso_string("2025-03-05T14:32:45.001Z").unwrap();
    assert!(a < b);
    assert!(a.to_iso_string() < b.to_iso_string());
}

#[test]
fn test_dtstr() {
    assert_eq!(dtstr(None), "---");
    assert_eq!(dtstr(Some("2025-03-05T14:32:45.000Z")), "2025-03-05 14:32:45");
    assert_eq!(dtstr(Some("garbage")), "garbage");
}
