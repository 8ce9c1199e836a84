use std::sync::OnceLock;

use regex::Regex;

struct Rule {
    pattern: &'static str,
    weight: i32,
}

const PERSON_FIELD: &str = r"\b(tech|techs|technician|advisor|adviser|writer|customer|client|driver|owner|employee|mechanic|salesperson|name)\b";

const METADATA_FIELD: &str = r"\b(phone|mobile|cell|fax|e ?mail|vin|plate|license|address|street|city|state|zip|postal)\b";

const DESCRIPTION_RULES: &[Rule] = &[
    Rule { pattern: r"\b(line description|work performed|description|desc)\b", weight: 7 },
    Rule { pattern: r"\b(complaint|concern|cause|correction)\b", weight: 6 },
    Rule { pattern: r"\b(job|jobs|service|services|operation|operations|op)\b", weight: 4 },
    Rule { pattern: r"\b(repair|maint|fix|work|diag|inspect)", weight: 2 },
    Rule { pattern: r"\b(notes?|memo|comments?)\b", weight: -1 },
    Rule { pattern: r"(\bid\b|\bno\b|\bnum\b|\bnumber\b|#|\binvoice\b|\bro\b)", weight: -2 },
];

const DESCRIPTION_FALLBACK: &str = r"(desc|job|service)";

const TOTAL_RULES: &[Rule] = &[
    Rule { pattern: r"\b(grand total|invoice total|total)\b", weight: 6 },
    // Lets a whole-order total outrank a per-line one.
    Rule { pattern: r"\b(grand|invoice|ro|order) total\b", weight: 5 },
    Rule { pattern: r"\b(line total|amount|price|extended)\b", weight: 4 },
    Rule { pattern: r"\b(labor|parts)\b", weight: 1 },
    Rule { pattern: r"\b(rate|tax|qty|quantity|cost)\b", weight: -3 },
];

struct Tables {
    person: Regex,
    metadata: Regex,
    description: Vec<(Regex, i32)>,
    description_fallback: Regex,
    total: Vec<(Regex, i32)>,
}

fn compile(rules: &[Rule]) -> Vec<(Regex, i32)> {
    rules
        .iter()
        .map(|rule| (Regex::new(rule.pattern).expect("classifier rule regex"), rule.weight))
        .collect()
}

fn tables() -> &'static Tables {
    static TABLES: OnceLock<Tables> = OnceLock::new();
    TABLES.get_or_init(|| Tables {
        person: Regex::new(PERSON_FIELD).expect("person field regex"),
        metadata: Regex::new(METADATA_FIELD).expect("metadata field regex"),
        description: compile(DESCRIPTION_RULES),
        description_fallback: Regex::new(DESCRIPTION_FALLBACK).expect("fallback regex"),
        total: compile(TOTAL_RULES),
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnScore {
    pub index: usize,
    pub score: i32,
}

/// Chosen column indices for one file; `None` when nothing qualifies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnChoice {
    pub description: Option<usize>,
    pub total: Option<usize>,
}

/// Trim, lowercase, treat `_`/`-` as spaces and collapse runs of whitespace.
pub fn normalize_header(header: &str) -> String {
    header
        .to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Description score for one header, or `None` if the header can never be
/// the description column.
pub fn description_score(header: &str) -> Option<i32> {
    let tables = tables();
    let header = normalize_header(header);
    if tables.person.is_match(&header) || tables.metadata.is_match(&header) {
        return None;
    }
    Some(weigh(&tables.description, &header))
}

pub fn total_score(header: &str) -> i32 {
    weigh(&tables().total, &normalize_header(header))
}

fn weigh(rules: &[(Regex, i32)], header: &str) -> i32 {
    rules
        .iter()
        .filter(|(pattern, _)| pattern.is_match(header))
        .map(|(_, weight)| weight)
        .sum()
}

/// Strictly-greater comparison, so ties go to the earliest column.
fn best_of(scores: impl Iterator<Item = ColumnScore>, floor: i32) -> Option<usize> {
    let mut best: Option<ColumnScore> = None;
    for candidate in scores {
        let current = best.map(|b| b.score).unwrap_or(floor);
        if candidate.score > current {
            best = Some(candidate);
        }
    }
    best.map(|b| b.index)
}

pub fn pick_description_column(headers: &[String]) -> Option<usize> {
    let scored = headers.iter().enumerate().filter_map(|(index, header)| {
        description_score(header).map(|score| ColumnScore { index, score })
    });

    best_of(scored, -1).or_else(|| {
        let tables = tables();
        headers.iter().position(|header| {
            let header = normalize_header(header);
            tables.description_fallback.is_match(&header) && !tables.person.is_match(&header)
        })
    })
}

pub fn pick_total_column(headers: &[String]) -> Option<usize> {
    let scored = headers.iter().enumerate().map(|(index, header)| ColumnScore {
        index,
        score: total_score(header),
    });
    best_of(scored, 0)
}

pub fn classify_columns(headers: &[String]) -> ColumnChoice {
    ColumnChoice {
        description: pick_description_column(headers),
        total: pick_total_column(headers),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn person_headers_never_win_over_job_description() {
        for person in ["technician", "advisor name", "driver"] {
            let before = headers(&[person, "job description"]);
            assert_eq!(pick_description_column(&before), Some(1), "{person} first");
            let after = headers(&["job description", person]);
            assert_eq!(pick_description_column(&after), Some(0), "{person} second");
        }
    }

    #[test]
    fn person_and_metadata_headers_are_rejected() {
        assert_eq!(description_score("Technician"), None);
        assert_eq!(description_score("Service Advisor"), None);
        assert_eq!(description_score("Customer Name"), None);
        assert_eq!(description_score("VIN"), None);
        assert_eq!(description_score("E-mail"), None);
        assert_eq!(description_score("License Plate"), None);
    }

    #[test]
    fn description_weights_accumulate() {
        assert_eq!(description_score("Line Description"), Some(7));
        assert_eq!(description_score("Job Description"), Some(11));
        assert_eq!(description_score("Correction"), Some(6));
        assert_eq!(description_score("Service"), Some(4));
        assert_eq!(description_score("Repair Notes"), Some(1));
        assert_eq!(description_score("Invoice #"), Some(-2));
        assert_eq!(description_score("Date"), Some(0));
    }

    #[test]
    fn headers_are_normalized_before_scoring() {
        assert_eq!(normalize_header("  Work   PERFORMED "), "work performed");
        assert_eq!(normalize_header("line_description"), "line description");
        assert_eq!(description_score("WORK_PERFORMED"), description_score("work performed"));
    }

    #[test]
    fn ties_go_to_first_column() {
        let cols = headers(&["Description", "Line Description"]);
        assert_eq!(pick_description_column(&cols), Some(0));
    }

    #[test]
    fn strong_description_beats_notes() {
        let cols = headers(&["RO #", "Notes", "Work Performed", "Technician", "Total"]);
        assert_eq!(pick_description_column(&cols), Some(2));
    }

    #[test]
    fn id_penalty_does_not_sink_strong_headers() {
        let cols = headers(&["Service #", "Invoice"]);
        // "service #" scores 4 - 2 = 2 and wins outright.
        assert_eq!(pick_description_column(&cols), Some(0));

        let cols = headers(&["Job ID Number", "Customer"]);
        // 4 - 2 = 2 also clears the floor.
        assert_eq!(pick_description_column(&cols), Some(0));

        let cols = headers(&["Invoice Desc No", "Owner"]);
        // 7 - 2 = 5.
        assert_eq!(pick_description_column(&cols), Some(0));
    }

    #[test]
    fn returns_none_when_every_header_is_rejected() {
        let cols = headers(&["Customer", "Phone", "VIN"]);
        assert_eq!(pick_description_column(&cols), None);
    }

    #[test]
    fn fallback_skips_person_fields() {
        let cols = headers(&["Invoice No", "Service Writer", "Descr No"]);
        // every surviving header scores -2, below the floor
        assert_eq!(pick_description_column(&cols), Some(2));
    }

    #[test]
    fn total_prefers_grand_total() {
        let cols = headers(&["Labor Rate", "Tax", "Line Total", "Grand Total"]);
        assert_eq!(pick_total_column(&cols), Some(3));
    }

    #[test]
    fn total_matches_anywhere_in_the_header() {
        for header in ["Ticket Total", "Total Due", "Total ($)", "Total Sale", "Sub Total", "sub_total"] {
            assert_eq!(total_score(header), 6, "{header}");
            let cols = headers(&["RO #", "Work Performed", header]);
            assert_eq!(pick_total_column(&cols), Some(2), "{header}");
        }
        assert_eq!(total_score("Grand Total"), 11);
        assert_eq!(total_score("Line Total"), 10);
    }

    #[test]
    fn repair_words_must_start_a_word() {
        assert_eq!(description_score("Prefix"), Some(0));
        assert_eq!(description_score("Network"), Some(0));
        assert_eq!(description_score("Repairs"), Some(2));
        assert_eq!(description_score("Maintenance"), Some(2));
    }

    #[test]
    fn total_penalizes_rates_and_costs() {
        assert_eq!(total_score("Labor Rate"), -2);
        assert_eq!(total_score("Parts Cost"), -2);
        assert_eq!(total_score("Amount"), 4);
        assert_eq!(total_score("Total"), 6);
        let cols = headers(&["Labor Rate", "Qty"]);
        assert_eq!(pick_total_column(&cols), None);
    }

    #[test]
    fn classify_columns_picks_both() {
        let cols = headers(&["RO Number", "Advisor", "Complaint", "Invoice Total"]);
        assert_eq!(
            classify_columns(&cols),
            ColumnChoice {
                description: Some(2),
                total: Some(3),
            }
        );
    }
}
