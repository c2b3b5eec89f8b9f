//! iCalendar (RFC 5545) export
//!
//! One `VCALENDAR` envelope with one `VEVENT` per event, built with the
//! `icalendar` crate. Times are always UTC basic format (`20250704T170000Z`).
//! Text values are escaped and long lines folded by the crate. Carriage
//! returns in user text are turned into newlines first, which come out as
//! an escaped `\n`.

use chrono::{DateTime, Utc};
use icalendar::{Calendar, Component, EventLike};

use crate::models::event::Event;

pub const PRODID: &str = "-//Kinship//Family Calendar//EN";

/// Domain suffix for event UIDs
pub const UID_DOMAIN: &str = "kinship";

pub const CONTENT_TYPE: &str = "text/calendar; charset=utf-8";

const CRLF: &str = "\r\n";

/// `YYYYMMDDTHHMMSSZ`
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Maps `\r\n` and lone `\r` to `\n`
pub fn normalize_line_breaks(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

/// Escapes free text the way a TEXT property value is written out
///
/// Backslash first, then newline, comma and semicolon. Escaping the
/// backslash first keeps the later replacements from being doubled.
pub fn escape_text(input: &str) -> String {
    normalize_line_breaks(input)
        .replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace(',', "\\,")
        .replace(';', "\\;")
}

/// Inverse of [`escape_text`]
pub fn unescape_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }

    out
}

/// Splits an escaped value on `delimiter` wherever it is not escaped, and
/// unescapes each part
pub fn split_unescaped(input: &str, delimiter: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        if c == '\\' {
            current.push(c);
            if let Some(next) = chars.next() {
                current.push(next);
            }
        } else if c == delimiter {
            parts.push(unescape_text(&current));
            current.clear();
        } else {
            current.push(c);
        }
    }
    parts.push(unescape_text(&current));

    parts
}

/// Renders a calendar document. `generated_at` becomes every `DTSTAMP`.
pub fn render_calendar<'a, I>(events: I, generated_at: DateTime<Utc>) -> String
where
    I: IntoIterator<Item = &'a Event>,
{
    let stamp = format_timestamp(generated_at);
    let mut calendar = Calendar::new();

    for event in events {
        calendar.push(to_vevent(event, &stamp));
    }

    with_product_id(&calendar.done().to_string())
}

fn to_vevent(event: &Event, stamp: &str) -> icalendar::Event {
    let mut vevent = icalendar::Event::new();
    vevent.uid(&format!("{}@{UID_DOMAIN}", event.id));
    vevent.add_property("DTSTAMP", stamp);
    vevent.add_property("DTSTART", format_timestamp(event.start_at));
    if let Some(end) = event.end_at {
        vevent.add_property("DTEND", format_timestamp(end));
    }
    vevent.summary(&normalize_line_breaks(&event.title));
    if let Some(location) = event.location.as_deref() {
        vevent.location(&normalize_line_breaks(location));
    }
    if let Some(description) = event.description.as_deref() {
        vevent.description(&normalize_line_breaks(description));
    }

    vevent.done()
}

/// Swaps the crate's default `PRODID` line for ours
fn with_product_id(ics: &str) -> String {
    let mut out = String::with_capacity(ics.len());

    for line in ics.lines() {
        if line.starts_with("PRODID:") {
            out.push_str("PRODID:");
            out.push_str(PRODID);
        } else {
            out.push_str(line);
        }
        out.push_str(CRLF);
    }

    out
}

/// Attachment file name derived from a title, e.g. `sunday-dinner.ics`
pub fn filename_for(title: &str) -> String {
    let mut slug = String::new();
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');

    if slug.is_empty() {
        "event.ics".to_string()
    } else {
        format!("{slug}.ics")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn event(title: &str) -> Event {
        let start = Utc.with_ymd_and_hms(2025, 11, 27, 18, 30, 0).unwrap();
        Event {
            id: Uuid::parse_str("6f1c2a4e-8b1d-4c3e-9a7f-0d5e6b2c1a90").unwrap(),
            family_id: Uuid::new_v4(),
            host_id: Uuid::new_v4(),
            title: title.to_string(),
            description: None,
            location: None,
            link: None,
            start_at: start,
            end_at: None,
            is_holiday: false,
            holiday_key: None,
            created_at: start,
            updated_at: start,
        }
    }

    #[test]
    fn test_format_timestamp() {
        let at = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(format_timestamp(at), "20250102T030405Z");
    }

    #[test]
    fn test_escape_order() {
        assert_eq!(escape_text(r"a\b"), r"a\\b");
        assert_eq!(escape_text("a\r\nb"), r"a\nb");
        assert_eq!(escape_text("a\nb"), r"a\nb");
        assert_eq!(escape_text("a,b;c"), r"a\,b\;c");
        // A literal backslash followed by n must not turn into a newline
        assert_eq!(escape_text(r"C:\new"), r"C:\\new");
        assert_eq!(unescape_text(&escape_text(r"C:\new")), r"C:\new");
    }

    #[test]
    fn test_escape_round_trip_through_split() {
        let fields = [
            "Dinner, drinks; dessert",
            r"back\slash",
            "two\nlines",
            r"tricky\,already",
        ];
        let joined = fields
            .iter()
            .map(|f| escape_text(f))
            .collect::<Vec<_>>()
            .join(",");

        assert_eq!(split_unescaped(&joined, ','), fields);
        assert_eq!(split_unescaped(&escape_text("a;b"), ';'), vec!["a;b"]);
    }

    /// Joins folded continuation lines back together
    fn unfold(doc: &str) -> String {
        doc.replace("\r\n ", "")
    }

    fn property<'d>(doc: &'d str, name: &str) -> Option<&'d str> {
        let prefix = format!("{name}:");
        doc.split("\r\n")
            .find_map(|line| line.strip_prefix(prefix.as_str()))
    }

    #[test]
    fn test_render_calendar_envelope() {
        let generated = Utc.with_ymd_and_hms(2025, 11, 1, 0, 0, 0).unwrap();
        let doc = render_calendar(std::iter::empty::<&Event>(), generated);

        assert!(doc.starts_with("BEGIN:VCALENDAR\r\n"));
        assert!(doc.ends_with("END:VCALENDAR\r\n"));
        assert!(doc.contains("\r\nVERSION:2.0\r\n"));
        assert_eq!(property(&doc, "PRODID"), Some(PRODID));
        assert_eq!(doc.matches("PRODID:").count(), 1);
        assert!(!doc.contains("BEGIN:VEVENT"));
    }

    #[test]
    fn test_render_event_block() {
        let mut thanksgiving = event("Thanksgiving; at Nana's, 6pm");
        thanksgiving.end_at = Some(thanksgiving.start_at + Duration::hours(3));
        thanksgiving.location = Some("12 Elm St, Springfield".to_string());
        thanksgiving.description = Some("Bring pie\nand chairs".to_string());
        let generated = Utc.with_ymd_and_hms(2025, 11, 1, 12, 0, 0).unwrap();

        let doc = unfold(&render_calendar([&thanksgiving], generated));

        assert_eq!(doc.matches("BEGIN:VEVENT\r\n").count(), 1);
        assert_eq!(doc.matches("END:VEVENT\r\n").count(), 1);
        assert_eq!(
            property(&doc, "UID"),
            Some("6f1c2a4e-8b1d-4c3e-9a7f-0d5e6b2c1a90@kinship")
        );
        assert_eq!(property(&doc, "DTSTAMP"), Some("20251101T120000Z"));
        assert_eq!(property(&doc, "DTSTART"), Some("20251127T183000Z"));
        assert_eq!(property(&doc, "DTEND"), Some("20251127T213000Z"));
        assert_eq!(
            property(&doc, "SUMMARY"),
            Some(r"Thanksgiving\; at Nana's\, 6pm")
        );
        assert_eq!(property(&doc, "LOCATION"), Some(r"12 Elm St\, Springfield"));
        assert_eq!(property(&doc, "DESCRIPTION"), Some(r"Bring pie\nand chairs"));
    }

    #[test]
    fn test_text_properties_unescape_to_input() {
        let mut picnic = event("Picnic, games; \\o/");
        picnic.description = Some("Blankets\nand a ball".to_string());

        let doc = unfold(&render_calendar([&picnic], Utc::now()));

        let summary = property(&doc, "SUMMARY").unwrap();
        assert_eq!(summary, escape_text(&picnic.title));
        assert_eq!(unescape_text(summary), picnic.title);
        assert_eq!(
            unescape_text(property(&doc, "DESCRIPTION").unwrap()),
            "Blankets\nand a ball"
        );
    }

    #[test]
    fn test_carriage_returns_cannot_break_lines() {
        let mut sneaky = event("Dinner\rEND:VCALENDAR");
        sneaky.location = Some("a\rb".to_string());
        sneaky.description = Some("one\r\ntwo\rBEGIN:VEVENT".to_string());

        let doc = render_calendar([&sneaky], Utc::now());

        assert!(!doc.replace("\r\n", "").contains('\r'), "stray CR in {doc:?}");
        assert!(!doc.replace("\r\n", "").contains('\n'), "stray LF in {doc:?}");
        let lines: Vec<&str> = doc.split("\r\n").collect();
        assert_eq!(lines.iter().filter(|l| **l == "BEGIN:VEVENT").count(), 1);
        assert_eq!(lines.iter().filter(|l| **l == "END:VCALENDAR").count(), 1);

        let doc = unfold(&doc);
        assert_eq!(property(&doc, "SUMMARY"), Some(r"Dinner\nEND:VCALENDAR"));
        assert_eq!(property(&doc, "LOCATION"), Some(r"a\nb"));
        assert_eq!(escape_text("a\rb"), r"a\nb");
    }

    #[test]
    fn test_long_lines_are_folded() {
        let long = "Cousins reunion ".repeat(12);
        let doc = render_calendar([&event(&long)], Utc::now());

        assert!(doc.contains("\r\n "), "expected a folded SUMMARY");
        assert_eq!(
            unescape_text(property(&unfold(&doc), "SUMMARY").unwrap()),
            long
        );
    }

    #[test]
    fn test_optional_properties_omitted() {
        let doc = render_calendar([&event("Picnic")], Utc::now());
        assert!(!doc.contains("DTEND"));
        assert!(!doc.contains("LOCATION"));
        assert!(!doc.contains("DESCRIPTION"));
        assert_eq!(doc.matches("BEGIN:VEVENT").count(), 1);
    }

    #[test]
    fn test_filename_for() {
        assert_eq!(filename_for("Sunday Dinner!"), "sunday-dinner.ics");
        assert_eq!(filename_for("  --  "), "event.ics");
        assert_eq!(filename_for("Grandpa's 80th"), "grandpa-s-80th.ics");
    }
}
