use std::collections::HashMap;

use once_cell::sync::Lazy;

const NAME_SUFFIXES: &[&str] = &["jr", "sr", "ii", "iii", "iv"];
const TEAM_NOISE_WORDS: &[&str] = &["fc", "cf", "afc", "sc", "ac", "club"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanMarket {
    pub name: String,
    pub period: Option<String>,
}

/// Handles "Last, First" ordering and known nicknames.
pub fn clean_subject(raw: &str, league: &str) -> String {
    let reordered = reorder_last_first(raw);
    let mut words = tokens(reordered.as_deref().unwrap_or(raw), false);
    while words.len() > 1
        && words
            .last()
            .is_some_and(|w| NAME_SUFFIXES.contains(&w.as_str()))
    {
        words.pop();
    }
    let joined = words.join(" ");
    lookup_alias(&SUBJECT_ALIASES, league, &joined)
        .map(str::to_string)
        .unwrap_or(joined)
}

pub fn clean_team(raw: &str, league: &str) -> String {
    let mut words = tokens(raw, false);
    if words.len() > 1 && words[0] == "the" {
        words.remove(0);
    }
    words.retain(|w| !TEAM_NOISE_WORDS.contains(&w.as_str()));
    let joined = words.join(" ");
    lookup_alias(&TEAM_ALIASES, league, &joined)
        .map(str::to_string)
        .unwrap_or(joined)
}

pub fn clean_league(raw: &str) -> String {
    let words = tokens(raw, false);
    let spaced = words.join(" ");
    if let Some(code) = LEAGUE_ALIASES.get(spaced.as_str()) {
        return (*code).to_string();
    }
    let collapsed = words.concat();
    if let Some(code) = LEAGUE_ALIASES.get(collapsed.as_str()) {
        return (*code).to_string();
    }
    collapsed.to_ascii_uppercase()
}

pub fn clean_position(raw: &str) -> String {
    let words = tokens(raw, false);
    let spaced = words.join(" ");
    if let Some(pos) = POSITION_ALIASES.get(spaced.as_str()) {
        return (*pos).to_string();
    }
    words.join("-").to_ascii_uppercase()
}

pub fn clean_market(raw: &str, sport: &str) -> CleanMarket {
    let words = tokens(raw, true);
    let (period, rest) = peel_period(&words);
    CleanMarket {
        name: market_key(&rest, sport),
        period,
    }
}

/// Splits a period qualifier (`1Q Points`, `F5 Strikeouts`) off a market name.
pub fn split_period(raw: &str) -> (Option<String>, String) {
    let words = tokens(raw, true);
    let (period, rest) = peel_period(&words);
    (period, rest.join(" "))
}

pub fn clean_period(raw: &str) -> Option<String> {
    let words = tokens(raw, false);
    parse_period(&words)
}

fn peel_period(words: &[String]) -> (Option<String>, Vec<String>) {
    for n in (1..=3).rev() {
        if words.len() <= n {
            continue;
        }
        if let Some(period) = parse_period(&words[..n]) {
            return (Some(period), words[n..].to_vec());
        }
        if let Some(period) = parse_period(&words[words.len() - n..]) {
            return (Some(period), words[..words.len() - n].to_vec());
        }
    }
    (None, words.to_vec())
}

fn parse_period(tokens: &[String]) -> Option<String> {
    match tokens {
        [one] => parse_compact_period(one),
        [ord, unit] => {
            let n = ordinal(ord)?;
            period_unit(unit, n)
        }
        [ord, five, innings] => {
            let first = ordinal(ord)? == 1;
            let five = five == "5" || five == "five";
            let innings = matches!(innings.as_str(), "innings" | "inning" | "inn");
            (first && five && innings).then(|| "F5".to_string())
        }
        _ => None,
    }
}

fn parse_compact_period(token: &str) -> Option<String> {
    if token == "f5" {
        return Some("F5".to_string());
    }
    let bytes = token.as_bytes();
    if bytes.len() != 2 {
        return None;
    }
    let (digit, unit) = if bytes[0].is_ascii_digit() {
        (bytes[0], bytes[1])
    } else if bytes[1].is_ascii_digit() {
        (bytes[1], bytes[0])
    } else {
        return None;
    };
    let n = digit - b'0';
    period_unit(&(unit as char).to_string(), n)
}

fn period_unit(unit: &str, n: u8) -> Option<String> {
    let (code, max) = match unit {
        "q" | "qtr" | "quarter" => ('Q', 4),
        "h" | "half" => ('H', 2),
        "p" | "prd" | "period" => ('P', 3),
        _ => return None,
    };
    (1..=max).contains(&n).then(|| format!("{n}{code}"))
}

fn ordinal(raw: &str) -> Option<u8> {
    match raw {
        "1" | "1st" | "first" => Some(1),
        "2" | "2nd" | "second" => Some(2),
        "3" | "3rd" | "third" => Some(3),
        "4" | "4th" | "fourth" => Some(4),
        _ => None,
    }
}

fn market_key(words: &[String], sport: &str) -> String {
    let mut parts: Vec<String> = Vec::new();
    for component in words.split(|w| w == "+") {
        if component.is_empty() {
            continue;
        }
        let joined = component.join(" ");
        let canonical = lookup_alias(&MARKET_ALIASES, &sport.to_ascii_lowercase(), &joined)
            .map(str::to_string)
            .unwrap_or(joined);
        parts.extend(canonical.split('+').map(str::to_string));
    }
    if parts.len() > 1 {
        parts.sort();
        parts.dedup();
    }
    parts.join("+")
}

fn reorder_last_first(raw: &str) -> Option<String> {
    let (last, first) = raw.split_once(',')?;
    if first.contains(',') {
        return None;
    }
    let first_words = tokens(first, false);
    if first_words.is_empty()
        || first_words
            .iter()
            .all(|w| NAME_SUFFIXES.contains(&w.as_str()))
    {
        return None;
    }
    Some(format!("{} {}", first.trim(), last.trim()))
}

/// Apostrophes and periods join their neighbours; other punctuation splits.
fn tokens(raw: &str, keep_plus: bool) -> Vec<String> {
    let mut cleaned = String::with_capacity(raw.len());
    for ch in raw.chars() {
        let ch = fold_char(ch);
        if ch.is_ascii_alphanumeric() {
            cleaned.push(ch);
        } else if matches!(ch, '\'' | '\u{2019}' | '`' | '.') {
            continue;
        } else if keep_plus && matches!(ch, '+' | '&') {
            cleaned.push_str(" + ");
        } else {
            cleaned.push(' ');
        }
    }
    cleaned.split_whitespace().map(str::to_string).collect()
}

fn fold_char(ch: char) -> char {
    match ch {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ą' | 'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' => 'a',
        'ç' | 'ć' | 'č' | 'Ç' | 'Ć' | 'Č' => 'c',
        'ď' | 'đ' | 'Đ' => 'd',
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ę' | 'ě' | 'È' | 'É' | 'Ê' | 'Ë' => 'e',
        'ğ' => 'g',
        'ì' | 'í' | 'î' | 'ï' | 'ı' | 'Ì' | 'Í' | 'Î' | 'Ï' => 'i',
        'ł' | 'Ł' => 'l',
        'ñ' | 'ń' | 'ň' | 'Ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ő' | 'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' => 'o',
        'ř' => 'r',
        'ś' | 'š' | 'ş' | 'Ś' | 'Š' | 'Ş' => 's',
        'ť' | 'ţ' => 't',
        'ù' | 'ú' | 'û' | 'ü' | 'ů' | 'ű' | 'Ù' | 'Ú' | 'Û' | 'Ü' => 'u',
        'ý' | 'ÿ' | 'Ý' => 'y',
        'ź' | 'ż' | 'ž' | 'Ź' | 'Ż' | 'Ž' => 'z',
        other => other.to_ascii_lowercase(),
    }
}

type AliasTable = HashMap<(&'static str, &'static str), &'static str>;

fn lookup_alias<'a>(table: &'a AliasTable, scope: &str, key: &str) -> Option<&'a str> {
    let scope = scope.to_ascii_lowercase();
    table
        .get(&(scope.as_str(), key))
        .or_else(|| table.get(&("*", key)))
        .copied()
}

fn alias_table(entries: &[(&'static str, &'static [&'static str], &'static str)]) -> AliasTable {
    let mut out = HashMap::new();
    for (scope, aliases, canonical) in entries {
        for alias in *aliases {
            out.insert((*scope, *alias), *canonical);
        }
    }
    out
}

static SUBJECT_ALIASES: Lazy<AliasTable> = Lazy::new(|| {
    alias_table(&[
        ("nba", &["nicolas claxton"], "nic claxton"),
        ("nba", &["herb jones"], "herbert jones"),
        ("nba", &["moe wagner"], "moritz wagner"),
        ("nba", &["cam johnson"], "cameron johnson"),
        ("nba", &["nahshon hyland"], "bones hyland"),
        ("nba", &["alexandre sarr"], "alex sarr"),
        ("nfl", &["gabe davis"], "gabriel davis"),
        ("nfl", &["hollywood brown"], "marquise brown"),
        ("nfl", &["kenneth walker"], "ken walker"),
        ("mlb", &["mike siani"], "michael siani"),
    ])
});

static TEAM_ALIASES: Lazy<AliasTable> = Lazy::new(|| {
    alias_table(&[
        ("nba", &["pho"], "phx"),
        ("nba", &["gs", "golden state"], "gsw"),
        ("nba", &["no", "nor", "new orleans"], "nop"),
        ("nba", &["ny"], "nyk"),
        ("nba", &["sa", "san antonio"], "sas"),
        ("nba", &["utah", "uth"], "uta"),
        ("nba", &["brk", "bro"], "bkn"),
        ("nba", &["cho"], "cha"),
        ("nba", &["wsh"], "was"),
        ("nba", &["la clippers", "los angeles clippers"], "lac"),
        ("nba", &["la lakers", "los angeles lakers"], "lal"),
        ("nfl", &["jac"], "jax"),
        ("nfl", &["kan"], "kc"),
        ("nfl", &["gnb"], "gb"),
        ("nfl", &["nwe"], "ne"),
        ("nfl", &["nor"], "no"),
        ("nfl", &["sfo"], "sf"),
        ("nfl", &["tam"], "tb"),
        ("nfl", &["lvr", "oak"], "lv"),
        ("nfl", &["wsh"], "was"),
        ("nfl", &["la rams"], "lar"),
        ("nfl", &["la chargers"], "lac"),
        ("mlb", &["chw"], "cws"),
        ("mlb", &["kcr"], "kc"),
        ("mlb", &["sdp"], "sd"),
        ("mlb", &["sfg"], "sf"),
        ("mlb", &["tbr"], "tb"),
        ("mlb", &["wsn", "was"], "wsh"),
        ("mlb", &["az"], "ari"),
        ("nhl", &["tbl"], "tb"),
        ("nhl", &["njd"], "nj"),
        ("nhl", &["lak"], "la"),
        ("nhl", &["sjs"], "sj"),
    ])
});

static MARKET_ALIASES: Lazy<AliasTable> = Lazy::new(|| {
    alias_table(&[
        ("*", &["pts", "point", "pts scored"], "points"),
        ("*", &["reb", "rebs", "rebound", "total rebounds"], "rebounds"),
        ("*", &["ast", "asts", "assist"], "assists"),
        ("*", &["stl", "stls", "steal"], "steals"),
        ("*", &["blk", "blks", "block", "blocked shots"], "blocks"),
        ("*", &["tov", "turnover"], "turnovers"),
        (
            "*",
            &[
                "3pm",
                "3pt made",
                "3 pt made",
                "3 pointers",
                "3 point field goals made",
                "threes",
                "threes made",
                "made threes",
                "3 pt field goals",
            ],
            "3 pointers made",
        ),
        ("*", &["fantasy points", "fantasy pts"], "fantasy score"),
        ("*", &["pra", "pts rebs asts", "pts reb ast", "points rebounds assists"], "points+rebounds+assists"),
        ("*", &["pr", "pts rebs", "points rebounds"], "points+rebounds"),
        ("*", &["pa", "pts asts", "points assists"], "points+assists"),
        ("*", &["ra", "rebs asts", "rebounds assists"], "rebounds+assists"),
        ("*", &["stocks", "blks stls", "blocks steals"], "blocks+steals"),
        ("basketball", &["to"], "turnovers"),
        ("*", &["pass yds", "passing yds", "pass yards"], "passing yards"),
        ("*", &["rush yds", "rushing yds", "rush yards"], "rushing yards"),
        ("*", &["rec yds", "receiving yds", "rec yards"], "receiving yards"),
        ("*", &["recs", "rec", "catches"], "receptions"),
        ("*", &["pass tds", "passing tds", "pass touchdowns"], "passing touchdowns"),
        ("*", &["sog", "shots"], "shots on goal"),
        ("baseball", &["ks", "so", "pitcher strikeouts", "pitcher ks"], "strikeouts"),
        ("baseball", &["h"], "hits"),
        ("baseball", &["r"], "runs"),
        ("baseball", &["hr", "homers"], "home runs"),
        ("baseball", &["rbi"], "rbis"),
        ("baseball", &["tb"], "total bases"),
        ("baseball", &["er", "earned runs allowed"], "earned runs"),
        ("hockey", &["saves made", "goalie saves"], "saves"),
    ])
});

static LEAGUE_ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut out = HashMap::new();
    for (aliases, code) in [
        (&["basketball nba", "basketballnba"][..], "NBA"),
        (&["basketball wnba", "basketballwnba"][..], "WNBA"),
        (
            &["ncaab", "cbb", "ncaam", "ncaamb", "college basketball", "basketball ncaab"][..],
            "NCAAB",
        ),
        (&["americanfootball nfl", "football nfl"][..], "NFL"),
        (&["ncaaf", "cfb", "college football", "americanfootball ncaaf"][..], "NCAAF"),
        (&["baseball mlb", "baseballmlb"][..], "MLB"),
        (&["icehockey nhl", "hockey nhl"][..], "NHL"),
        (&["epl", "premier league", "soccer epl", "english premier league"][..], "EPL"),
        (&["champions league", "ucl", "soccer uefa champs league"][..], "UCL"),
    ] {
        for alias in aliases {
            out.insert(*alias, code);
        }
    }
    out
});

static POSITION_ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("point guard", "PG"),
        ("shooting guard", "SG"),
        ("small forward", "SF"),
        ("power forward", "PF"),
        ("center", "C"),
        ("guard", "G"),
        ("forward", "F"),
        ("quarterback", "QB"),
        ("running back", "RB"),
        ("wide receiver", "WR"),
        ("tight end", "TE"),
        ("kicker", "K"),
        ("pitcher", "P"),
        ("starting pitcher", "SP"),
        ("relief pitcher", "RP"),
        ("defenseman", "D"),
        ("left wing", "LW"),
        ("right wing", "RW"),
    ])
});
