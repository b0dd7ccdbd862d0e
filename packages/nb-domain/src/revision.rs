use time::{Duration, OffsetDateTime};

/// Timestamp for a new revision: `now` at microsecond precision, forced strictly past `prev`.
pub fn next_updated_at(prev: OffsetDateTime, now: OffsetDateTime) -> OffsetDateTime {
	let now = truncate_to_micros(now);

	if now > prev { now } else { prev + Duration::microseconds(1) }
}

/// Drops sub-microsecond digits so values survive a round trip through `timestamptz`.
pub fn truncate_to_micros(value: OffsetDateTime) -> OffsetDateTime {
	value.replace_nanosecond(value.nanosecond() / 1_000 * 1_000).unwrap_or(value)
}

/// Current time at storage precision.
pub fn now() -> OffsetDateTime {
	truncate_to_micros(OffsetDateTime::now_utc())
}
