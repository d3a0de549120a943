//! Formatting helpers for outbound WhatsApp text (Spanish locale dates, times,
//! message chunking).

use chrono::{DateTime, Datelike, NaiveDate};

const MONTHS_ES: [&str; 12] = [
    "enero",
    "febrero",
    "marzo",
    "abril",
    "mayo",
    "junio",
    "julio",
    "agosto",
    "septiembre",
    "octubre",
    "noviembre",
    "diciembre",
];

/// Spanish long date: `10 de marzo de 2025`.
pub fn long_date_es(date: NaiveDate) -> String {
    let month = MONTHS_ES[date.month0() as usize];
    format!("{} de {} de {}", date.day(), month, date.year())
}

/// Render a `YYYY-MM-DD` (or RFC3339) date in Spanish long form.
///
/// Anything unparseable is returned verbatim so a bad upstream value still shows up.
pub fn long_date_es_from_str(raw: &str) -> String {
    let raw = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return long_date_es(d);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return long_date_es(dt.date_naive());
    }
    raw.to_string()
}

/// `08:15` stays as is; RFC3339 timestamps become `HH:MM` in their own offset.
pub fn clock_time(raw: &str) -> String {
    let raw = raw.trim();
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => dt.format("%H:%M").to_string(),
        Err(_) => raw.to_string(),
    }
}

/// Split `text` into chunks of at most `limit` chars, preferring line breaks.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    if limit == 0 || text.chars().count() <= limit {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len > limit {
            // Hard-split a single oversized line.
            let mut buf = String::new();
            let mut n = 0usize;
            for c in line.chars() {
                if n == limit {
                    chunks.push(std::mem::take(&mut buf));
                    n = 0;
                }
                buf.push(c);
                n += 1;
            }
            current = buf;
            current_len = n;
            continue;
        }
        current.push_str(line);
        current_len += line_len;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
