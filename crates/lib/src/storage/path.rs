//! Blob key layout:
//! `{system}/date={Y}-{MM}-{DD}/{HH}/{mm}/{HH}-{mm}-{ss}_{timestamp}_{userId}.json`.
//!
//! Date and time segments come from the wall clock in a fixed partition zone, never the
//! host's local zone, so every deployment partitions identically.

use chrono::{DateTime, Datelike, FixedOffset, Offset, Timelike, Utc};
use std::str::FromStr;

use crate::channels::TextMessageEvent;

const HOUR: i32 = 3600;

/// Named zones without daylight saving, and their UTC offsets in hours. Zones with daylight
/// saving are not accepted: a fixed offset would split their partitions twice a year.
const NAMED_ZONES: &[(&str, i32)] = &[
    ("UTC", 0),
    ("Etc/UTC", 0),
    ("GMT", 0),
    ("Japan", 9),
    ("Asia/Tokyo", 9),
    ("JST", 9),
];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unsupported partition timezone {0:?} (use one of UTC, Etc/UTC, GMT, Japan, Asia/Tokyo, JST, or a fixed offset like +09:00)")]
pub struct PartitionZoneError(pub String);

/// Timezone the partition segments are computed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionZone {
    name: String,
    offset: FixedOffset,
}

impl PartitionZone {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Asia/Tokyo (UTC+09:00).
    pub fn japan() -> Self {
        Self {
            name: "Japan".to_string(),
            offset: FixedOffset::east_opt(9 * HOUR).unwrap_or(Utc.fix()),
        }
    }
}

/// Parse "+HH:MM", "-HH:MM", "+HHMM" or "+HH".
fn parse_offset(s: &str) -> Option<FixedOffset> {
    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (h, m) = match digits.len() {
        2 => (digits.parse::<i32>().ok()?, 0),
        4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
        _ => return None,
    };
    if h > 23 || m > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (h * HOUR + m * 60))
}

impl FromStr for PartitionZone {
    type Err = PartitionZoneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        if let Some((name, hours)) = NAMED_ZONES
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(t))
        {
            let offset = FixedOffset::east_opt(hours * HOUR)
                .ok_or_else(|| PartitionZoneError(s.to_string()))?;
            return Ok(Self {
                name: (*name).to_string(),
                offset,
            });
        }
        parse_offset(t)
            .map(|offset| Self {
                name: t.to_string(),
                offset,
            })
            .ok_or_else(|| PartitionZoneError(s.to_string()))
    }
}

/// Derives blob keys for events. Pure: the same clock reading and event give the same key.
#[derive(Debug, Clone)]
pub struct PartitionScheme {
    pub system_name: String,
    pub zone: PartitionZone,
}

impl PartitionScheme {
    pub fn new(system_name: impl Into<String>, zone: PartitionZone) -> Self {
        Self {
            system_name: system_name.into(),
            zone,
        }
    }

    /// Key for an event seen at `now`. `user_id` is used as-is; no escaping is applied.
    pub fn blob_key(&self, now: DateTime<Utc>, timestamp: i64, user_id: &str) -> String {
        let t = now.with_timezone(&self.zone.offset);
        format!(
            "{sys}/date={y}-{mo:02}-{d:02}/{h:02}/{mi:02}/{h:02}-{mi:02}-{s:02}_{ts}_{uid}.json",
            sys = self.system_name,
            y = t.year(),
            mo = t.month(),
            d = t.day(),
            h = t.hour(),
            mi = t.minute(),
            s = t.second(),
            ts = timestamp,
            uid = user_id,
        )
    }

    pub fn key_for(&self, now: DateTime<Utc>, event: &TextMessageEvent) -> String {
        self.blob_key(now, event.timestamp, &event.user_id)
    }
}
