//! Shift roster parser for group chat postings.
//!
//! Staff post rosters as free text, e.g.
//!
//! ```text
//! *Turno Noche 10/03/2025*
//! Enfermera: María López
//! TENS: Juan Pérez y Ana Soto
//! Dr. Rojas (médico)
//! ```
//!
//! Extraction is best effort and line based: known role labels, the shift period
//! and a date are picked up wherever they appear, and anything unrecognised is
//! ignored. Parsing is pure and never fails; unusable input yields
//! [`ParseOutcome::NotShift`].

use std::sync::OnceLock;

use chrono::{Datelike, Local, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::messaging::types::InboundMessage;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShiftPeriod {
    Morning,
    Afternoon,
    Night,
    /// Long day shift ("turno largo" / "diurno").
    Day,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffAssignment {
    pub role: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedShift {
    pub date: Option<NaiveDate>,
    pub shift_period: Option<ShiftPeriod>,
    /// In message order.
    pub staff_assignments: Vec<StaffAssignment>,
    /// Id of the message the shift was parsed from.
    pub raw_text_ref: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseOutcome {
    Shift(ParsedShift),
    NotShift,
}

const HEADER_KEYWORDS: &[&str] = &["turno", "turnos", "guardia", "entrega", "dotacion"];
const DATE_LABELS: &[&str] = &["fecha", "dia", "date"];
const MAX_LABEL_CHARS: usize = 40;
const MAX_LABEL_WORDS: usize = 5;

/// Parse an inbound group message. Year-less dates take the message's local year.
pub fn parse_shift(msg: &InboundMessage) -> ParseOutcome {
    let reference = msg.timestamp.with_timezone(&Local).date_naive();
    parse_text(&msg.raw_text, reference, &msg.message_id.0)
}

pub fn parse_text(text: &str, reference_date: NaiveDate, raw_ref: &str) -> ParseOutcome {
    let mut date: Option<NaiveDate> = None;
    let mut period: Option<ShiftPeriod> = None;
    let mut header_seen = false;
    let mut staff: Vec<StaffAssignment> = Vec::new();

    for raw_line in text.lines() {
        let line = clean_line(raw_line);
        if line.is_empty() {
            continue;
        }
        let folded = fold(&line);

        if date.is_none() {
            date = find_date(&line, &folded, reference_date);
        }

        // "Médico de turno: ..." is a role line even though it mentions "turno".
        let known_role_label = line
            .split_once(':')
            .is_some_and(|(label, _)| canonical_role(&fold(label.trim())).is_some());

        if !known_role_label && has_header_keyword(&folded) {
            header_seen = true;
            period = period.or_else(|| find_period(&folded));
            if let Some((_, value)) = line.split_once(':') {
                staff.extend(split_names(value).into_iter().filter_map(|item| parenthetical_role(&item)));
            }
            continue;
        }

        if is_period_only(&folded) {
            period = period.or_else(|| find_period(&folded));
            continue;
        }

        if let Some(found) = labelled_assignments(&line) {
            staff.extend(found);
            continue;
        }

        if let Some(found) = parenthetical_role(&line).or_else(|| dashed_role(&line)) {
            staff.push(found);
        }
    }

    let looks_like_shift = header_seen || period.is_some();
    let has_content = !staff.is_empty() || date.is_some();
    if !(looks_like_shift && has_content) {
        return ParseOutcome::NotShift;
    }

    ParseOutcome::Shift(ParsedShift {
        date,
        shift_period: period,
        staff_assignments: staff,
        raw_text_ref: raw_ref.to_string(),
    })
}

/// `Role: name, name y name`. Returns `None` when the line is not a role line.
fn labelled_assignments(line: &str) -> Option<Vec<StaffAssignment>> {
    let (label, value) = line.split_once(':')?;
    let label = label.trim().trim_end_matches('.').trim();
    let value = value.trim();
    if label.is_empty() || value.is_empty() {
        return None;
    }
    if label.chars().count() > MAX_LABEL_CHARS
        || label.split_whitespace().count() > MAX_LABEL_WORDS
        || !label.chars().any(char::is_alphabetic)
    {
        return None;
    }

    let label_folded = fold(label);
    if DATE_LABELS.contains(&label_folded.as_str()) {
        // Date lines carry no staff; the date itself was already picked up.
        return Some(Vec::new());
    }

    let role = canonical_role(&label_folded)
        .map(str::to_string)
        .unwrap_or_else(|| label.to_string());

    let found: Vec<StaffAssignment> = split_names(value)
        .into_iter()
        .map(|name| match parenthetical_role(&name) {
            Some(inner) => StaffAssignment {
                role: role.clone(),
                name: inner.name,
            },
            None => StaffAssignment {
                role: role.clone(),
                name,
            },
        })
        .collect();

    if found.is_empty() {
        None
    } else {
        Some(found)
    }
}

/// `María López (enfermera)`.
fn parenthetical_role(item: &str) -> Option<StaffAssignment> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^(.+?)\s*\(([^)]+)\)\s*$").expect("valid regex"));
    let caps = re.captures(item.trim())?;
    let role = canonical_role(&fold(caps.get(2)?.as_str().trim()))?;
    let name = clean_name(caps.get(1)?.as_str())?;
    Some(StaffAssignment {
        role: role.to_string(),
        name,
    })
}

/// `Enfermera - María López` or `María López - Enfermera`.
fn dashed_role(line: &str) -> Option<StaffAssignment> {
    let (left, right) = line
        .split_once(" - ")
        .or_else(|| line.split_once(" – "))
        .or_else(|| line.split_once(" — "))?;

    if let Some(role) = canonical_role(&fold(left.trim())) {
        return Some(StaffAssignment {
            role: role.to_string(),
            name: clean_name(right)?,
        });
    }
    if let Some(role) = canonical_role(&fold(right.trim())) {
        return Some(StaffAssignment {
            role: role.to_string(),
            name: clean_name(left)?,
        });
    }
    None
}

fn split_names(value: &str) -> Vec<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?i)\s+y\s+|\s+e\s+|[,;/&+]").expect("valid regex"));
    re.split(value).filter_map(clean_name).collect()
}

fn clean_name(raw: &str) -> Option<String> {
    let name = raw
        .trim()
        .trim_start_matches(['-', '–', '—'])
        .trim_end_matches(['.', '-'])
        .trim();
    if !name.chars().any(char::is_alphabetic) {
        return None;
    }
    Some(name.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Map a folded role label to its canonical display name.
///
/// Matches the whole label first, then its first word, so "enfermera de turno"
/// and "medico residente" resolve.
fn canonical_role(label_folded: &str) -> Option<&'static str> {
    const ROLES: &[(&[&str], &str)] = &[
        (
            &["enfermera", "enfermero", "enfermeras", "enfermeros", "enfermeria", "enf", "eu"],
            "Enfermería",
        ),
        (
            &["tens", "tecnico", "tecnicos", "tecnica", "tec", "paramedico", "paramedicos"],
            "TENS",
        ),
        (
            &["medico", "medicos", "medica", "doctor", "doctora", "dr", "dra", "medico de turno"],
            "Médico",
        ),
        (&["residente", "residentes"], "Residente"),
        (&["interno", "interna", "internos", "internas"], "Interno"),
        (&["matrona", "matron", "matronas"], "Matrona"),
        (
            &["kinesiologo", "kinesiologa", "kinesiologos", "kinesiologia", "kine"],
            "Kinesiología",
        ),
        (&["auxiliar", "auxiliares", "aux"], "Auxiliar"),
        (
            &["supervisor", "supervisora", "jefe de turno", "jefa de turno"],
            "Supervisión",
        ),
    ];

    let label = label_folded.trim().trim_end_matches('.');
    let lookup = |needle: &str| {
        ROLES
            .iter()
            .find(|(aliases, _)| aliases.contains(&needle))
            .map(|(_, canonical)| *canonical)
    };

    lookup(label).or_else(|| {
        let first = label.split_whitespace().next()?.trim_end_matches('.');
        lookup(first)
    })
}

fn has_header_keyword(folded: &str) -> bool {
    words(folded).any(|w| HEADER_KEYWORDS.contains(&w))
}

fn period_for_word(word: &str) -> Option<ShiftPeriod> {
    match word {
        "manana" | "am" => Some(ShiftPeriod::Morning),
        "tarde" | "pm" => Some(ShiftPeriod::Afternoon),
        "noche" | "nocturno" => Some(ShiftPeriod::Night),
        "dia" | "diurno" | "largo" => Some(ShiftPeriod::Day),
        _ => None,
    }
}

fn find_period(folded: &str) -> Option<ShiftPeriod> {
    words(folded).find_map(period_for_word)
}

/// A line such as `NOCHE` or `Turno de noche` with nothing else on it.
fn is_period_only(folded: &str) -> bool {
    let mut any_period = false;
    for w in words(folded) {
        if period_for_word(w).is_some() {
            any_period = true;
        } else if !matches!(w, "de" | "del" | "la" | "el") {
            return false;
        }
    }
    any_period
}

fn find_date(line: &str, folded: &str, reference: NaiveDate) -> Option<NaiveDate> {
    static NUMERIC: OnceLock<Regex> = OnceLock::new();
    static TEXTUAL: OnceLock<Regex> = OnceLock::new();

    let numeric = NUMERIC.get_or_init(|| {
        Regex::new(r"\b(\d{1,2})[/.\-](\d{1,2})(?:[/.\-](\d{4}|\d{2}))?\b").expect("valid regex")
    });
    for caps in numeric.captures_iter(line) {
        let day: u32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let year = match caps.get(3) {
            Some(y) => expand_year(y.as_str())?,
            None => reference.year(),
        };
        if let Some(d) = NaiveDate::from_ymd_opt(year, month, day) {
            return Some(d);
        }
    }

    let textual = TEXTUAL.get_or_init(|| {
        Regex::new(r"\b(\d{1,2})\s+de\s+([a-z]+)(?:\s+(?:de|del)?\s*(\d{4}))?").expect("valid regex")
    });
    for caps in textual.captures_iter(folded) {
        let Some(month) = month_number(&caps[2]) else {
            continue;
        };
        let day: u32 = caps[1].parse().ok()?;
        let year = match caps.get(3) {
            Some(y) => y.as_str().parse().ok()?,
            None => reference.year(),
        };
        if let Some(d) = NaiveDate::from_ymd_opt(year, month, day) {
            return Some(d);
        }
    }
    None
}

fn expand_year(raw: &str) -> Option<i32> {
    let y: i32 = raw.parse().ok()?;
    Some(if raw.len() == 2 { 2000 + y } else { y })
}

fn month_number(name: &str) -> Option<u32> {
    let n = match name {
        "enero" => 1,
        "febrero" => 2,
        "marzo" => 3,
        "abril" => 4,
        "mayo" => 5,
        "junio" => 6,
        "julio" => 7,
        "agosto" => 8,
        "septiembre" | "setiembre" => 9,
        "octubre" => 10,
        "noviembre" => 11,
        "diciembre" => 12,
        _ => return None,
    };
    Some(n)
}

/// Strip bullets, leading emoji and WhatsApp emphasis markers; collapse whitespace.
fn clean_line(raw: &str) -> String {
    let no_marks: String = raw
        .chars()
        .filter(|c| !matches!(c, '*' | '_' | '~' | '`'))
        .collect();
    let trimmed = no_marks.trim_start_matches(|c: char| {
        !(c.is_alphanumeric() || c == '(')
    });
    trimmed.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase and strip Spanish diacritics for keyword matching.
fn fold(s: &str) -> String {
    s.chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            other => other,
        })
        .collect()
}

fn words(folded: &str) -> impl Iterator<Item = &str> {
    folded
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
}
