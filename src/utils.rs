use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Stripe delivers monetary amounts in minor units; records store major units.
pub fn minor_to_major(amount: i64) -> f64 {
    amount as f64 / 100.0
}

pub fn rfc3339(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339).unwrap_or_default()
}

pub fn from_unix(ts: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(ts).ok()
}
