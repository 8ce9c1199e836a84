/// One decoded line: fields in header order.
pub type RawRow = Vec<String>;

/// Splits one line on `,`, treating `"` as a toggle for quoted state so that
/// commas inside quotes stay in the field. Quote characters themselves are
/// dropped and a doubled quote is not collapsed to a single one.
pub fn decode_line(line: &str) -> RawRow {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in line.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    fields.push(current.trim().to_string());

    fields
}

/// Decodes a whole export: drops blank lines and a leading byte-order mark.
pub fn decode_text(text: &str) -> Vec<RawRow> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(decode_line)
        .collect()
}
