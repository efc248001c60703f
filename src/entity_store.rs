use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use crate::clean::{clean_league, clean_market, clean_period, clean_position, clean_subject, clean_team};
use crate::error::StoreResult;
use crate::matcher::SubjectCandidate;
use crate::model::{EntityKind, EntitySet, Game, GameStatus, League, Market, Subject, Team};

pub trait EntitySource: Send + Sync {
    fn load_all(&self) -> StoreResult<EntitySet>;
    fn load_subjects(&self) -> StoreResult<Vec<Subject>>;
}

const BUILTIN_LEAGUES: &[(&str, &str)] = &[
    ("NBA", "Basketball"),
    ("WNBA", "Basketball"),
    ("NCAAB", "Basketball"),
    ("NFL", "Football"),
    ("NCAAF", "Football"),
    ("CFL", "Football"),
    ("MLB", "Baseball"),
    ("NHL", "Hockey"),
    ("EPL", "Soccer"),
    ("UCL", "Soccer"),
    ("MLS", "Soccer"),
    ("PGA", "Golf"),
    ("ATP", "Tennis"),
    ("WTA", "Tennis"),
    ("UFC", "MMA"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectScope<'a> {
    Team(&'a str),
    Position(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRef<'a> {
    League(&'a League),
    Team(&'a Team),
    Subject(&'a Subject),
    Market(&'a Market),
    Game(&'a Game),
}

impl EntityRef<'_> {
    pub fn id(&self) -> &str {
        match self {
            EntityRef::League(l) => &l.code,
            EntityRef::Team(t) => &t.id,
            EntityRef::Subject(s) => &s.id,
            EntityRef::Market(m) => &m.id,
            EntityRef::Game(g) => &g.id,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntityCounts {
    pub leagues: usize,
    pub teams: usize,
    pub subjects: usize,
    pub markets: usize,
    pub active_games: usize,
}

#[derive(Debug, Default)]
struct LeagueIndex {
    by_code: HashMap<String, League>,
    by_alias: HashMap<String, String>,
}

impl LeagueIndex {
    fn build(leagues: Vec<League>) -> Self {
        let mut out = LeagueIndex::default();
        for (code, sport) in BUILTIN_LEAGUES {
            out.insert(League {
                code: (*code).to_string(),
                sport: (*sport).to_string(),
                aliases: Vec::new(),
            });
        }
        for mut league in leagues {
            league.code = clean_league(&league.code);
            if league.code.is_empty() {
                continue;
            }
            out.insert(league);
        }
        out
    }

    fn insert(&mut self, league: League) {
        self.by_alias.insert(league.code.clone(), league.code.clone());
        for alias in &league.aliases {
            let key = clean_league(alias);
            if !key.is_empty() {
                self.by_alias.insert(key, league.code.clone());
            }
        }
        self.by_code.insert(league.code.clone(), league);
    }
}

#[derive(Debug, Default)]
struct TeamIndex {
    by_id: HashMap<String, Team>,
    by_key: HashMap<String, String>,
}

impl TeamIndex {
    fn build(mut teams: Vec<Team>) -> Self {
        teams.sort_by(|a, b| a.id.cmp(&b.id));
        let mut out = TeamIndex::default();
        for mut team in teams {
            team.league = clean_league(&team.league);
            team.abbr_name = team.abbr_name.trim().to_ascii_uppercase();
            let names = std::iter::once(team.abbr_name.as_str())
                .chain(std::iter::once(team.full_name.as_str()))
                .chain(team.aliases.iter().map(String::as_str));
            for name in names {
                let cleaned = clean_team(name, &team.league);
                if cleaned.is_empty() {
                    continue;
                }
                match out.by_key.entry(index_key(&[&team.league, &cleaned])) {
                    Entry::Occupied(existing) => {
                        if existing.get() != &team.id {
                            warn!(
                                league = %team.league,
                                alias = %cleaned,
                                kept = %existing.get(),
                                dropped = %team.id,
                                "duplicate team alias"
                            );
                        }
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(team.id.clone());
                    }
                }
            }
            out.by_id.insert(team.id.clone(), team);
        }
        out
    }

    fn get(&self, league: &str, raw: &str) -> Option<&Team> {
        let cleaned = clean_team(raw, league);
        if cleaned.is_empty() {
            return None;
        }
        let id = self.by_key.get(&index_key(&[league, &cleaned]))?;
        self.by_id.get(id)
    }

    /// Abbreviation of the team `raw` names, or `raw` upper-cased when no team matches.
    fn canonical_abbr(&self, league: &str, raw: &str) -> String {
        match self.get(league, raw) {
            Some(team) => team.abbr_name.clone(),
            None => raw.trim().to_ascii_uppercase(),
        }
    }
}

#[derive(Debug, Default)]
struct SubjectIndex {
    by_id: HashMap<String, Subject>,
    scoped: HashMap<String, Vec<String>>,
    by_name: HashMap<String, Vec<String>>,
    candidates: HashMap<String, Vec<SubjectCandidate>>,
}

impl SubjectIndex {
    fn build(mut subjects: Vec<Subject>, teams: &TeamIndex) -> Self {
        subjects.sort_by(|a, b| a.id.cmp(&b.id));
        let mut out = SubjectIndex::default();
        for mut subject in subjects {
            subject.league = clean_league(&subject.league);
            subject.team = subject
                .team
                .take()
                .map(|t| teams.canonical_abbr(&subject.league, &t))
                .filter(|t| !t.is_empty());
            let name_key = clean_subject(&subject.name, &subject.league);
            if name_key.is_empty() {
                warn!(id = %subject.id, name = %subject.name, "subject name cleans to nothing");
                continue;
            }

            if let Some(team) = subject.team.as_deref() {
                let key = scoped_key(&subject.league, SubjectScope::Team(team), &name_key);
                out.scoped.entry(key).or_default().push(subject.id.clone());
            }
            if let Some(position) = subject.position.as_deref() {
                let position = clean_position(position);
                if !position.is_empty() {
                    let key =
                        scoped_key(&subject.league, SubjectScope::Position(&position), &name_key);
                    out.scoped.entry(key).or_default().push(subject.id.clone());
                }
            }
            out.by_name
                .entry(index_key(&[&subject.league, &name_key]))
                .or_default()
                .push(subject.id.clone());
            out.candidates
                .entry(subject.league.clone())
                .or_default()
                .push(SubjectCandidate::new(subject.id.clone(), name_key));
            out.by_id.insert(subject.id.clone(), subject);
        }
        out
    }
}

#[derive(Debug, Default)]
struct MarketIndex {
    by_id: HashMap<String, Market>,
    by_key: HashMap<String, String>,
}

impl MarketIndex {
    fn build(mut markets: Vec<Market>) -> Self {
        markets.sort_by(|a, b| a.id.cmp(&b.id));
        let mut out = MarketIndex::default();
        for mut market in markets {
            let cleaned = clean_market(&market.name, &market.sport);
            market.period = market
                .period
                .as_deref()
                .and_then(clean_period)
                .or(cleaned.period);
            let key = market_key(&market.sport, market.period.as_deref(), &cleaned.name);
            match out.by_key.entry(key) {
                Entry::Occupied(existing) => {
                    warn!(
                        market = %market.name,
                        kept = %existing.get(),
                        dropped = %market.id,
                        "duplicate market key"
                    );
                }
                Entry::Vacant(slot) => {
                    slot.insert(market.id.clone());
                }
            }
            out.by_id.insert(market.id.clone(), market);
        }
        out
    }
}

#[derive(Debug, Default)]
struct GameIndex {
    by_id: HashMap<String, Game>,
    by_team: HashMap<String, String>,
}

impl GameIndex {
    fn build(games: Vec<Game>, teams: &TeamIndex) -> Self {
        let mut out = GameIndex::default();
        for mut game in games {
            game.league = clean_league(&game.league);
            game.home_team = teams.canonical_abbr(&game.league, &game.home_team);
            game.away_team = teams.canonical_abbr(&game.league, &game.away_team);
            if game.home_team == game.away_team {
                warn!(id = %game.id, team = %game.home_team, "game lists the same team twice, skipping");
                continue;
            }
            out.by_id.insert(game.id.clone(), game);
        }

        // A team maps to at most one active game: live beats scheduled, then the earliest start.
        let mut active: Vec<&Game> = out.by_id.values().filter(|g| g.is_active()).collect();
        active.sort_by(|a, b| {
            let a_live = a.status == GameStatus::Live;
            let b_live = b.status == GameStatus::Live;
            b_live
                .cmp(&a_live)
                .then_with(|| a.game_time.cmp(&b.game_time))
                .then_with(|| a.id.cmp(&b.id))
        });
        let mut by_team = HashMap::new();
        for game in active {
            for team in [&game.home_team, &game.away_team] {
                by_team
                    .entry(index_key(&[&game.league, team]))
                    .or_insert_with(|| game.id.clone());
            }
        }
        out.by_team = by_team;
        out
    }
}

#[derive(Debug, Default)]
pub struct EntitySnapshot {
    leagues: Arc<LeagueIndex>,
    teams: Arc<TeamIndex>,
    subjects: Arc<SubjectIndex>,
    markets: Arc<MarketIndex>,
    games: Arc<GameIndex>,
}

impl EntitySnapshot {
    pub fn build(set: EntitySet) -> Self {
        // Subject and game team references resolve against the team index.
        let teams = TeamIndex::build(set.teams);
        let subjects = SubjectIndex::build(set.subjects, &teams);
        let games = GameIndex::build(set.games, &teams);
        Self {
            leagues: Arc::new(LeagueIndex::build(set.leagues)),
            teams: Arc::new(teams),
            subjects: Arc::new(subjects),
            markets: Arc::new(MarketIndex::build(set.markets)),
            games: Arc::new(games),
        }
    }

    pub fn with_subjects(&self, subjects: Vec<Subject>) -> Self {
        Self {
            leagues: Arc::clone(&self.leagues),
            teams: Arc::clone(&self.teams),
            subjects: Arc::new(SubjectIndex::build(subjects, &self.teams)),
            markets: Arc::clone(&self.markets),
            games: Arc::clone(&self.games),
        }
    }

    pub fn counts(&self) -> EntityCounts {
        EntityCounts {
            leagues: self.leagues.by_code.len(),
            teams: self.teams.by_id.len(),
            subjects: self.subjects.by_id.len(),
            markets: self.markets.by_id.len(),
            active_games: self.games.by_id.values().filter(|g| g.is_active()).count(),
        }
    }

    pub fn league(&self, code: &str) -> Option<&League> {
        self.leagues.by_code.get(code)
    }

    pub fn league_by_alias(&self, raw: &str) -> Option<&League> {
        let code = self.leagues.by_alias.get(&clean_league(raw))?;
        self.leagues.by_code.get(code)
    }

    pub fn team(&self, id: &str) -> Option<&Team> {
        self.teams.by_id.get(id)
    }

    /// `league` must already be a canonical code.
    pub fn team_by_alias(&self, league: &str, raw: &str) -> Option<&Team> {
        self.teams.get(league, raw)
    }

    pub fn subject(&self, id: &str) -> Option<&Subject> {
        self.subjects.by_id.get(id)
    }

    /// Subject ids for an already-cleaned name within a scope. Sorted by id.
    pub fn subjects_scoped(&self, league: &str, scope: SubjectScope<'_>, name_key: &str) -> &[String] {
        self.subjects
            .scoped
            .get(&scoped_key(league, scope, name_key))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn subjects_by_name(&self, league: &str, name_key: &str) -> &[String] {
        self.subjects
            .by_name
            .get(&index_key(&[league, name_key]))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn subject_candidates(&self, league: &str) -> &[SubjectCandidate] {
        self.subjects
            .candidates
            .get(league)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn market(&self, id: &str) -> Option<&Market> {
        self.markets.by_id.get(id)
    }

    /// `name_key` must already be cleaned with `clean_market`.
    pub fn market_by_key(&self, sport: &str, period: Option<&str>, name_key: &str) -> Option<&Market> {
        let id = self.markets.by_key.get(&market_key(sport, period, name_key))?;
        self.markets.by_id.get(id)
    }

    pub fn game(&self, id: &str) -> Option<&Game> {
        self.games.by_id.get(id)
    }

    pub fn game_for_team(&self, league: &str, team: &str) -> Option<&Game> {
        let key = index_key(&[league, &self.teams.canonical_abbr(league, team)]);
        let id = self.games.by_team.get(&key)?;
        self.games.by_id.get(id)
    }

    /// Forward lookup by raw name. Subjects resolve only when the name is unique in the league.
    pub fn lookup(&self, kind: EntityKind, league: &str, raw: &str) -> Option<EntityRef<'_>> {
        match kind {
            EntityKind::League => self.league_by_alias(raw).map(EntityRef::League),
            EntityKind::Team => {
                let league = self.league_by_alias(league)?;
                self.team_by_alias(&league.code, raw).map(EntityRef::Team)
            }
            EntityKind::Subject => {
                let league = self.league_by_alias(league)?;
                match self.subjects_by_name(&league.code, &clean_subject(raw, &league.code)) {
                    [only] => self.subject(only).map(EntityRef::Subject),
                    _ => None,
                }
            }
            EntityKind::Market => {
                let league = self.league_by_alias(league)?;
                let cleaned = clean_market(raw, &league.sport);
                self.market_by_key(&league.sport, cleaned.period.as_deref(), &cleaned.name)
                    .map(EntityRef::Market)
            }
            EntityKind::Game => {
                let league = self.league_by_alias(league)?;
                self.game_for_team(&league.code, raw).map(EntityRef::Game)
            }
        }
    }

    pub fn reverse_lookup(&self, kind: EntityKind, id: &str) -> Option<EntityRef<'_>> {
        match kind {
            EntityKind::League => self.league(id).map(EntityRef::League),
            EntityKind::Team => self.team(id).map(EntityRef::Team),
            EntityKind::Subject => self.subject(id).map(EntityRef::Subject),
            EntityKind::Market => self.market(id).map(EntityRef::Market),
            EntityKind::Game => self.game(id).map(EntityRef::Game),
        }
    }
}

pub struct EntityStore {
    source: Option<Box<dyn EntitySource>>,
    current: RwLock<Arc<EntitySnapshot>>,
}

impl EntityStore {
    /// Initial load must succeed; later refresh failures keep serving the last snapshot.
    pub fn open(source: Box<dyn EntitySource>) -> StoreResult<Self> {
        let set = source.load_all()?;
        let snapshot = EntitySnapshot::build(set);
        log_counts("entity store loaded", &snapshot);
        Ok(Self {
            source: Some(source),
            current: RwLock::new(Arc::new(snapshot)),
        })
    }

    pub fn from_set(set: EntitySet) -> Self {
        Self {
            source: None,
            current: RwLock::new(Arc::new(EntitySnapshot::build(set))),
        }
    }

    pub fn snapshot(&self) -> Arc<EntitySnapshot> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    pub fn load(&self, set: EntitySet) {
        self.swap(EntitySnapshot::build(set));
    }

    pub fn refresh(&self) -> bool {
        let Some(source) = self.source.as_ref() else {
            return false;
        };
        match source.load_all() {
            Ok(set) => {
                let snapshot = EntitySnapshot::build(set);
                log_counts("entity store refreshed", &snapshot);
                self.swap(snapshot);
                true
            }
            Err(err) => {
                warn!(error = %err, "entity refresh failed, serving previous snapshot");
                false
            }
        }
    }

    pub fn refresh_subjects(&self) -> bool {
        let Some(source) = self.source.as_ref() else {
            return false;
        };
        match source.load_subjects() {
            Ok(subjects) => {
                let snapshot = self.snapshot().with_subjects(subjects);
                info!(subjects = snapshot.counts().subjects, "subject index refreshed");
                self.swap(snapshot);
                true
            }
            Err(err) => {
                warn!(error = %err, "subject refresh failed, serving previous snapshot");
                false
            }
        }
    }

    fn swap(&self, snapshot: EntitySnapshot) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(snapshot);
    }
}

fn log_counts(message: &str, snapshot: &EntitySnapshot) {
    let counts = snapshot.counts();
    info!(
        leagues = counts.leagues,
        teams = counts.teams,
        subjects = counts.subjects,
        markets = counts.markets,
        active_games = counts.active_games,
        "{message}"
    );
}

fn index_key(parts: &[&str]) -> String {
    let mut key = String::with_capacity(parts.iter().map(|p| p.len() + 1).sum());
    for (idx, part) in parts.iter().enumerate() {
        if idx > 0 {
            key.push('|');
        }
        key.push_str(part);
    }
    key
}

fn scoped_key(league: &str, scope: SubjectScope<'_>, name_key: &str) -> String {
    match scope {
        SubjectScope::Team(team) => index_key(&[league, "team", team, name_key]),
        SubjectScope::Position(position) => index_key(&[league, "pos", position, name_key]),
    }
}

fn market_key(sport: &str, period: Option<&str>, name_key: &str) -> String {
    index_key(&[&sport.to_ascii_lowercase(), period.unwrap_or(""), name_key])
}
