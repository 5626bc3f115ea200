//! Date extraction for messages that carry no INTERNALDATE of their own
//! (mbox imports).

use chrono::{DateTime, TimeZone, Utc};
use mailparse::MailHeaderMap;

/// Determine the APPEND INTERNALDATE for a raw RFC 822 message.
///
/// Falls back through `Date`, `Resent-Date`, `Delivery-date`, the earliest
/// parseable `Received:` timestamp, and finally the current wall-clock time.
pub fn message_internal_date(raw: &[u8]) -> DateTime<Utc> {
    extract_header_date(raw).unwrap_or_else(Utc::now)
}

fn extract_header_date(raw: &[u8]) -> Option<DateTime<Utc>> {
    let (headers, _) = mailparse::parse_headers(raw).ok()?;

    for key in ["Date", "Resent-Date", "Delivery-date"] {
        if let Some(value) = headers.get_first_value(key) {
            if let Some(date) = parse_rfc2822(&value) {
                return Some(date);
            }
        }
    }

    // Received trace lines carry the timestamp after the last semicolon.
    let mut earliest: Option<DateTime<Utc>> = None;
    for value in headers.get_all_values("Received") {
        let candidate = value.rsplit(';').next().unwrap_or(&value);
        if let Some(date) = parse_rfc2822(candidate) {
            earliest = Some(match earliest {
                Some(prev) if prev <= date => prev,
                _ => date,
            });
        }
    }
    earliest
}

fn parse_rfc2822(value: &str) -> Option<DateTime<Utc>> {
    let ts = mailparse::dateparse(value.trim()).ok()?;
    Utc.timestamp_opt(ts, 0).single()
}
