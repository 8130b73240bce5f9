//! Second-precision UTC timestamps with a compact CBOR form

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

// The derive would demand `T: Copy`, which `DateTime<T>` does not grant;
// `DateTime<Utc>` itself is `Copy`, so the concrete impl is sound.
impl Copy for TimeStamp<Utc> {}

impl TimeStamp<Utc> {
    /// The current time, truncated to whole seconds: the CBOR form
    /// stores seconds only, and a record reread from storage must
    /// compare equal to the one the operation returned.
    pub fn new() -> Self {
        let now = Utc::now();
        Self(now.with_nanosecond(0).unwrap_or(now))
    }

    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap()
            .into()
    }

    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }

    /// Calendar-month bucket, e.g. `"2026-08"`. Keys sort chronologically.
    pub fn month_key(&self) -> String {
        format!("{:04}-{:02}", self.0.year(), self.0.month())
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl From<DateTime<Utc>> for TimeStamp<Utc> {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

// Stored as i64 unix seconds, same wire shape on every record.
impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.i64(self.0.timestamp())?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let secs = d.i64()?;

        DateTime::from_timestamp(secs, 0)
            .map(TimeStamp)
            .ok_or(minicbor::decode::Error::message(
                "failed to convert timestamp to utc",
            ))
    }
}
