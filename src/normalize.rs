use std::sync::OnceLock;

use regex::Regex;

pub const GENERAL_REPAIR: &str = "General Repair";

const MAX_LABEL_CHARS: usize = 90;

const ROLE_PREFIX: &str = r"(?i)^(tech|technician|service advisor|advisor|writer|mechanic)\s*[:\-]\s*";

// Short all-letter values are treated as person names unless they carry
// one of these words.
const REPAIR_VOCABULARY: &str = r"(?i)\b(oil|lube|filter|brake|brakes|pad|pads|rotor|rotors|tire|tires|rotate|rotation|align|alignment|balance|battery|inspection|inspect|diag|diagnostic|diagnosis|tune|flush|coolant|transmission|trans|belt|belts|hose|hoses|spark|plug|plugs|wiper|wipers|exhaust|muffler|engine|hvac|service|repair|replace|replaced|change|check|install|mount|light|lights|bulb|fluid|strut|struts|shock|shocks|axle|clutch|starter|alternator|radiator|pump|sensor|emissions|smog|detail|wash|labor|maintenance)\b";

struct Patterns {
    role_prefix: Regex,
    repair_vocabulary: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        role_prefix: Regex::new(ROLE_PREFIX).expect("role prefix regex"),
        repair_vocabulary: Regex::new(REPAIR_VOCABULARY).expect("repair vocabulary regex"),
    })
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// At most two tokens made only of letters, periods, apostrophes and hyphens.
fn looks_like_person_name(value: &str) -> bool {
    let tokens: Vec<&str> = value.split(' ').collect();
    tokens.len() <= 2
        && tokens.iter().all(|token| {
            token
                .chars()
                .all(|ch| ch.is_alphabetic() || matches!(ch, '.' | '\'' | '-'))
        })
        && !patterns().repair_vocabulary.is_match(value)
}

/// Cleans a description cell into an aggregation label.
///
/// Blank cells and values shaped like a bare name become
/// [`GENERAL_REPAIR`]; a leading `Tech:`-style role label is dropped and the
/// result is capped at 90 characters.
pub fn normalize_description(raw: &str) -> String {
    let cleaned = collapse_whitespace(raw);
    if cleaned.is_empty() || looks_like_person_name(&cleaned) {
        return GENERAL_REPAIR.to_string();
    }

    let stripped = patterns().role_prefix.replace(&cleaned, "");
    let label: String = stripped.trim().chars().take(MAX_LABEL_CHARS).collect();
    if label.is_empty() {
        GENERAL_REPAIR.to_string()
    } else {
        label
    }
}

/// Identity key for a label: case and whitespace insensitive.
pub fn label_key(label: &str) -> String {
    collapse_whitespace(label).to_lowercase()
}
