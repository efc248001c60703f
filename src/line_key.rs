pub const KEY_DELIMITER: char = ':';

/// `bookmaker:league:subject_or_team_id:market_id:label:line`
pub fn build_key(
    bookmaker: &str,
    league: &str,
    entity_id: &str,
    market_id: &str,
    label: &str,
    line: f64,
) -> String {
    let line = format_line(line);
    [bookmaker, league, entity_id, market_id, label, line.as_str()]
        .iter()
        .map(|part| sanitize(part))
        .collect::<Vec<_>>()
        .join(&KEY_DELIMITER.to_string())
}

/// Shortest round-tripping decimal, with `-0` and `27.0` folded to `0` and `27`.
pub fn format_line(line: f64) -> String {
    if line == 0.0 {
        return "0".to_string();
    }
    format!("{line}")
}

pub fn normalize_label(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "o" | "over" | "more" | "higher" => "Over".to_string(),
        "u" | "under" | "less" | "lower" => "Under".to_string(),
        "y" | "yes" => "Yes".to_string(),
        "n" | "no" => "No".to_string(),
        _ => {
            let mut chars = trimmed.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        }
    }
}

fn sanitize(part: &str) -> String {
    part.trim().replace(KEY_DELIMITER, "_")
}
