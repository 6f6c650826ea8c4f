//! Filename → program metadata.
//!
//! Transcript filenames follow a handful of loose conventions, one per
//! program. The stem is normalized (extension dropped, `_` read as a space,
//! misspelled "Transcription" suffixes removed) and then tried against an
//! ordered rule table; the first rule that matches decides the variant.
//!
//! | Order | Variant | Required tokens |
//! |-------|---------|-----------------|
//! | 1 | `Podcast` | `Episode NN` + 4-digit year |
//! | 2 | `MMM` | 3-letter cohort + month + `MMM` |
//! | 3 | `MWM` | month + 4-digit year + `Session NN` |
//! | 4 | `Workshop` | `PEA 2024`-style cohort + `Workshop NN` + `Session N` |
//!
//! Filenames matching none of these map to [`ProgramMetadata::Unknown`] and
//! are still ingested.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::MappingError;

/// Calendar month, always rendered in its canonical 3-letter form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Month {
    Jan,
    Feb,
    Mar,
    Apr,
    May,
    Jun,
    Jul,
    Aug,
    Sep,
    Oct,
    Nov,
    Dec,
}

impl Month {
    /// Parse a full or abbreviated English month name, case-insensitively.
    pub fn parse(token: &str) -> Option<Month> {
        let month = match token.to_ascii_lowercase().as_str() {
            "jan" | "january" => Month::Jan,
            "feb" | "february" => Month::Feb,
            "mar" | "march" => Month::Mar,
            "apr" | "april" => Month::Apr,
            "may" => Month::May,
            "jun" | "june" => Month::Jun,
            "jul" | "july" => Month::Jul,
            "aug" | "august" => Month::Aug,
            "sep" | "sept" | "september" => Month::Sep,
            "oct" | "october" => Month::Oct,
            "nov" | "november" => Month::Nov,
            "dec" | "december" => Month::Dec,
            _ => return None,
        };
        Some(month)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Month::Jan => "Jan",
            Month::Feb => "Feb",
            Month::Mar => "Mar",
            Month::Apr => "Apr",
            Month::May => "May",
            Month::Jun => "Jun",
            Month::Jul => "Jul",
            Month::Aug => "Aug",
            Month::Sep => "Sep",
            Month::Oct => "Oct",
            Month::Nov => "Nov",
            Month::Dec => "Dec",
        }
    }
}

impl std::fmt::Display for Month {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Program-specific metadata derived from a filename.
///
/// Serializes flat with a `program` tag, e.g.
/// `{"program":"Podcast","episode_number":269,"year":2025}`. Field names
/// shared between variants always carry the same type so they can be used
/// as index filter keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "program")]
pub enum ProgramMetadata {
    Podcast {
        episode_number: u32,
        year: i32,
    },
    #[serde(rename = "MMM")]
    Mmm {
        cohort: String,
        month: Month,
        #[serde(skip_serializing_if = "Option::is_none")]
        year: Option<i32>,
    },
    #[serde(rename = "MWM")]
    Mwm {
        month: Month,
        year: i32,
        session_name: String,
        session_number: u32,
    },
    Workshop {
        cohort: String,
        workshop_number: u32,
        session_number: u32,
        year: i32,
    },
    Unknown {
        raw_filename: String,
    },
}

impl ProgramMetadata {
    /// The `program` tag value.
    pub fn program(&self) -> &'static str {
        match self {
            ProgramMetadata::Podcast { .. } => "Podcast",
            ProgramMetadata::Mmm { .. } => "MMM",
            ProgramMetadata::Mwm { .. } => "MWM",
            ProgramMetadata::Workshop { .. } => "Workshop",
            ProgramMetadata::Unknown { .. } => "Unknown",
        }
    }

    pub fn year(&self) -> Option<i32> {
        match self {
            ProgramMetadata::Podcast { year, .. }
            | ProgramMetadata::Mwm { year, .. }
            | ProgramMetadata::Workshop { year, .. } => Some(*year),
            ProgramMetadata::Mmm { year, .. } => *year,
            ProgramMetadata::Unknown { .. } => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, ProgramMetadata::Unknown { .. })
    }

    /// Flat key/value view used as vector index metadata.
    pub fn to_metadata(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// Map a filename to its program metadata.
///
/// Never fails: unmatched filenames and unparseable numeric tokens degrade
/// to [`ProgramMetadata::Unknown`] with a warning.
pub fn map_filename(filename: &str) -> ProgramMetadata {
    match try_map_filename(filename) {
        Ok(meta) => {
            if meta.is_unknown() {
                tracing::warn!(filename, "no filename pattern matched, ingesting with reduced metadata");
            }
            meta
        }
        Err(e) => {
            tracing::warn!(filename, error = %e, "filename metadata unparseable, falling back to Unknown");
            unknown(filename)
        }
    }
}

/// Strict variant of [`map_filename`] that surfaces [`MappingError`]s.
pub fn try_map_filename(filename: &str) -> Result<ProgramMetadata, MappingError> {
    let stem = normalize_stem(filename);
    for rule in RULES {
        if !(rule.applies)(&stem) {
            continue;
        }
        if let Some(meta) = (rule.extract)(&stem)? {
            tracing::debug!(filename, rule = rule.family, "filename matched");
            return Ok(meta);
        }
    }
    Ok(unknown(filename))
}

fn unknown(filename: &str) -> ProgramMetadata {
    ProgramMetadata::Unknown {
        raw_filename: base_name(filename).to_string(),
    }
}

struct Rule {
    family: &'static str,
    applies: fn(&str) -> bool,
    extract: fn(&str) -> Result<Option<ProgramMetadata>, MappingError>,
}

const RULES: &[Rule] = &[
    Rule {
        family: "Podcast",
        applies: podcast_applies,
        extract: extract_podcast,
    },
    Rule {
        family: "MMM",
        applies: mmm_applies,
        extract: extract_mmm,
    },
    Rule {
        family: "MWM",
        applies: mwm_applies,
        extract: extract_mwm,
    },
    Rule {
        family: "Workshop",
        applies: workshop_applies,
        extract: extract_workshop,
    },
];

static EPISODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:episode|ep)\.?\s*#?\s*(\d+)\b").expect("episode regex"));
static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b((?:19|20)\d{2})\b").expect("year regex"));
static MMM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bMMM\b").expect("mmm regex"));
static MONTH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec)\b",
    )
    .expect("month regex")
});
static SESSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bsession\s*#?\s*(\d+)\b").expect("session regex"));
static WORKSHOP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bworkshop\s*#?\s*(\d+)\b").expect("workshop regex"));
static COHORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z]{3})\b").expect("cohort regex"));
static COHORT_YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z]{3})\s*((?:19|20)\d{2})\b").expect("cohort year regex"));

/// Spellings of "Transcription" seen in real filenames. Longest first so the
/// alternation never stops at a shorter prefix.
const TRANSCRIPTION_SPELLINGS: &[&str] = &[
    "transcriptions",
    "transcription",
    "transcriptoin",
    "transcripition",
    "transcripiton",
    "transkription",
    "trasncription",
    "transcripton",
    "transciption",
    "trancription",
    "transcrption",
    "tanscription",
    "transcrition",
    "transcript",
];

static TRANSCRIPTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)(?:{})\b", TRANSCRIPTION_SPELLINGS.join("|")))
        .expect("transcription regex")
});

/// Tokens that look like a cohort but are something else.
const NOT_A_COHORT: &[&str] = &[
    "MMM", "MWM", "POD", "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT",
    "NOV", "DEC",
];

fn base_name(filename: &str) -> &str {
    filename
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(filename)
}

fn normalize_stem(filename: &str) -> String {
    let name = base_name(filename);
    let stem = match name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            stem
        }
        _ => name,
    };
    let spaced = stem.replace('_', " ");
    let stripped = TRANSCRIPTION_RE.replace_all(&spaced, " ");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_u32(rule: &'static str, field: &'static str, token: &str) -> Result<u32, MappingError> {
    token.parse().map_err(|_| MappingError::InvalidNumber {
        rule,
        field,
        token: token.to_string(),
    })
}

fn parse_year(rule: &'static str, token: &str) -> Result<i32, MappingError> {
    token.parse().map_err(|_| MappingError::InvalidNumber {
        rule,
        field: "year",
        token: token.to_string(),
    })
}

/// First 4-digit year outside `skip` (the byte range of another numeric token).
fn find_year(stem: &str, skip: Option<std::ops::Range<usize>>) -> Option<&str> {
    YEAR_RE
        .captures_iter(stem)
        .filter_map(|c| c.get(1))
        .find(|m| match &skip {
            Some(range) => m.end() <= range.start || m.start() >= range.end,
            None => true,
        })
        .map(|m| m.as_str())
}

fn find_month(stem: &str) -> Option<Month> {
    MONTH_RE
        .captures_iter(stem)
        .filter_map(|c| c.get(1))
        .find_map(|m| Month::parse(m.as_str()))
}

fn find_cohort(stem: &str) -> Option<&str> {
    COHORT_RE
        .captures_iter(stem)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .find(|token| !NOT_A_COHORT.contains(token))
}

fn podcast_applies(stem: &str) -> bool {
    EPISODE_RE.is_match(stem) && YEAR_RE.is_match(stem)
}

fn mmm_applies(stem: &str) -> bool {
    MMM_RE.is_match(stem) && MONTH_RE.is_match(stem)
}

fn mwm_applies(stem: &str) -> bool {
    MONTH_RE.is_match(stem) && YEAR_RE.is_match(stem) && SESSION_RE.is_match(stem)
}

fn workshop_applies(stem: &str) -> bool {
    WORKSHOP_RE.is_match(stem) && SESSION_RE.is_match(stem)
}

fn extract_podcast(stem: &str) -> Result<Option<ProgramMetadata>, MappingError> {
    let Some(episode) = EPISODE_RE.captures(stem).and_then(|c| c.get(1)) else {
        return Ok(None);
    };
    let Some(year) = find_year(stem, Some(episode.range())) else {
        return Ok(None);
    };
    Ok(Some(ProgramMetadata::Podcast {
        episode_number: parse_u32("Podcast", "episode_number", episode.as_str())?,
        year: parse_year("Podcast", year)?,
    }))
}

fn extract_mmm(stem: &str) -> Result<Option<ProgramMetadata>, MappingError> {
    let (Some(cohort), Some(month)) = (find_cohort(stem), find_month(stem)) else {
        return Ok(None);
    };
    let year = find_year(stem, None)
        .map(|y| parse_year("MMM", y))
        .transpose()?;
    Ok(Some(ProgramMetadata::Mmm {
        cohort: cohort.to_string(),
        month,
        year,
    }))
}

fn extract_mwm(stem: &str) -> Result<Option<ProgramMetadata>, MappingError> {
    let Some(session) = SESSION_RE.captures(stem).and_then(|c| c.get(1)) else {
        return Ok(None);
    };
    let (Some(month), Some(year)) = (find_month(stem), find_year(stem, Some(session.range())))
    else {
        return Ok(None);
    };
    Ok(Some(ProgramMetadata::Mwm {
        month,
        year: parse_year("MWM", year)?,
        session_name: format!("Session {}", session.as_str()),
        session_number: parse_u32("MWM", "session_number", session.as_str())?,
    }))
}

fn extract_workshop(stem: &str) -> Result<Option<ProgramMetadata>, MappingError> {
    let Some(cohort) = COHORT_YEAR_RE
        .captures_iter(stem)
        .find(|c| c.get(1).is_some_and(|t| !NOT_A_COHORT.contains(&t.as_str())))
    else {
        return Ok(None);
    };
    let (Some(token), Some(year)) = (cohort.get(1), cohort.get(2)) else {
        return Ok(None);
    };
    let (Some(workshop), Some(session)) = (
        WORKSHOP_RE.captures(stem).and_then(|c| c.get(1)),
        SESSION_RE.captures(stem).and_then(|c| c.get(1)),
    ) else {
        return Ok(None);
    };
    Ok(Some(ProgramMetadata::Workshop {
        cohort: format!("{} {}", token.as_str(), year.as_str()),
        workshop_number: parse_u32("Workshop", "workshop_number", workshop.as_str())?,
        session_number: parse_u32("Workshop", "session_number", session.as_str())?,
        year: parse_year("Workshop", year.as_str())?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn podcast_episode_and_year() {
        let meta = map_filename("POD 2025 - Episode 269 - Audio.docx");
        assert_eq!(
            meta,
            ProgramMetadata::Podcast {
                episode_number: 269,
                year: 2025
            }
        );
    }

    #[test]
    fn podcast_year_is_not_taken_from_episode_number() {
        let meta = map_filename("Episode 2019 - recorded 2023.docx");
        assert_eq!(
            meta,
            ProgramMetadata::Podcast {
                episode_number: 2019,
                year: 2023
            }
        );
    }

    #[test]
    fn workshop_cohort_and_numbers() {
        let meta = map_filename("PEA 2024 - Workshop 05 - Session 1 - Transcription.docx");
        assert_eq!(
            meta,
            ProgramMetadata::Workshop {
                cohort: "PEA 2024".to_string(),
                workshop_number: 5,
                session_number: 1,
                year: 2024,
            }
        );
    }

    #[test]
    fn mmm_cohort_month_year() {
        let meta = map_filename("PEP Apr 2025 MMM - Pricing.docx");
        assert_eq!(
            meta,
            ProgramMetadata::Mmm {
                cohort: "PEP".to_string(),
                month: Month::Apr,
                year: Some(2025),
            }
        );
    }

    #[test]
    fn mmm_full_month_name_is_canonicalized() {
        let meta = map_filename("PEA_September_MMM.docx");
        assert_eq!(
            meta,
            ProgramMetadata::Mmm {
                cohort: "PEA".to_string(),
                month: Month::Sep,
                year: None,
            }
        );
    }

    #[test]
    fn mwm_tolerates_transcription_misspellings() {
        for name in [
            "MWM March 2025 Session 03 Transcription.docx",
            "MWM March 2025 Session 03 Transcripton.docx",
            "MWM March 2025 Session 03Trancription.docx",
            "MWM_March_2025_Session_03_Transciption.docx",
        ] {
            assert_eq!(
                map_filename(name),
                ProgramMetadata::Mwm {
                    month: Month::Mar,
                    year: 2025,
                    session_name: "Session 03".to_string(),
                    session_number: 3,
                },
                "filename: {}",
                name
            );
        }
    }

    #[test]
    fn unmatched_filename_is_unknown() {
        let meta = map_filename("notes from the call.docx");
        assert_eq!(
            meta,
            ProgramMetadata::Unknown {
                raw_filename: "notes from the call.docx".to_string()
            }
        );
        assert!(meta.is_unknown());
        assert_eq!(meta.year(), None);
    }

    #[test]
    fn unknown_keeps_only_the_base_name() {
        let meta = map_filename("inbox/misc/recording.docx");
        assert_eq!(
            meta,
            ProgramMetadata::Unknown {
                raw_filename: "recording.docx".to_string()
            }
        );
    }

    #[test]
    fn numeric_overflow_is_mapping_error() {
        let name = "POD 2025 - Episode 99999999999999999999.docx";
        let err = try_map_filename(name).unwrap_err();
        assert!(matches!(
            err,
            MappingError::InvalidNumber {
                field: "episode_number",
                ..
            }
        ));
        assert!(map_filename(name).is_unknown());
    }

    #[test]
    fn first_matching_rule_wins() {
        // Carries both an episode marker and workshop tokens.
        let meta = map_filename("PEA 2024 Workshop 2 Session 1 Episode 7.docx");
        assert_eq!(meta.program(), "Podcast");
    }

    #[test]
    fn metadata_is_flat_and_tagged() {
        let meta = ProgramMetadata::Workshop {
            cohort: "PEA 2024".into(),
            workshop_number: 5,
            session_number: 1,
            year: 2024,
        }
        .to_metadata();
        assert_eq!(meta["program"], "Workshop");
        assert_eq!(meta["cohort"], "PEA 2024");
        assert_eq!(meta["workshop_number"], 5);
        assert_eq!(meta["year"], 2024);

        let mmm = ProgramMetadata::Mmm {
            cohort: "PEP".into(),
            month: Month::Oct,
            year: None,
        }
        .to_metadata();
        assert_eq!(mmm["program"], "MMM");
        assert_eq!(mmm["month"], "Oct");
        assert!(!mmm.contains_key("year"));
    }

    #[test]
    fn month_parse_variants() {
        assert_eq!(Month::parse("sept"), Some(Month::Sep));
        assert_eq!(Month::parse("DECEMBER"), Some(Month::Dec));
        assert_eq!(Month::parse("Marc"), None);
    }
}
