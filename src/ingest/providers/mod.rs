pub mod exchange;
pub mod merged;
pub mod rss;
pub mod scraped;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

/// Indian Standard Time; exchange and government timestamps without an offset are IST.
pub fn ist() -> FixedOffset {
    FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap_or_else(|| Utc.fix())
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    OffsetDateTime::parse(ts, &Rfc2822)
        .ok()
        .and_then(|dt| DateTime::from_timestamp(dt.unix_timestamp(), 0))
}

/// Feed dates: RFC 2822 first, then RFC 3339, then a few offset-less layouts read as IST.
pub fn parse_feed_date(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    if ts.is_empty() {
        return None;
    }
    if let Some(d) = parse_rfc2822(ts) {
        return Some(d);
    }
    if let Ok(d) = DateTime::parse_from_rfc3339(ts) {
        return Some(d.with_timezone(&Utc));
    }
    // Some publishers emit RFC 2822 with a zone name `time` does not know.
    if let Ok(d) = DateTime::parse_from_str(ts, "%a, %d %b %Y %H:%M:%S %z") {
        return Some(d.with_timezone(&Utc));
    }
    for layout in ["%a, %d %b %Y %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(n) = NaiveDateTime::parse_from_str(ts, layout) {
            return from_ist(n);
        }
    }
    // "Mon, 06 Jan 2026 10:00:00 IST" and friends: drop the trailing zone word.
    if let Some((head, _zone)) = ts.rsplit_once(' ') {
        if let Ok(n) = NaiveDateTime::parse_from_str(head, "%a, %d %b %Y %H:%M:%S") {
            return from_ist(n);
        }
    }
    None
}

/// Date-only listing cells (`"Oct 17, 2026"` with `"%b %d, %Y"`), taken as IST midnight.
pub fn parse_listing_date(ts: &str, layout: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    if let Ok(n) = NaiveDateTime::parse_from_str(ts, layout) {
        return from_ist(n);
    }
    NaiveDate::parse_from_str(ts, layout)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .and_then(from_ist)
}

pub fn from_ist(n: NaiveDateTime) -> Option<DateTime<Utc>> {
    ist()
        .from_local_datetime(&n)
        .single()
        .map(|d| d.with_timezone(&Utc))
}

/// Replace HTML-only entities that make strict XML parsers choke.
pub(crate) fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}
