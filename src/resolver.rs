use std::sync::Arc;

use tracing::warn;

use crate::clean::{clean_league, clean_market, clean_period, clean_position, clean_subject, clean_team};
use crate::entity_store::{EntitySnapshot, EntityStore, SubjectScope};
use crate::matcher::{LevenshteinMatcher, SubjectMatcher};
use crate::model::{EntityKind, League, Subject};
use crate::report::Reporter;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectAttrs {
    pub team: Option<String>,
    pub position: Option<String>,
}

impl SubjectAttrs {
    pub fn team(team: impl Into<String>) -> Self {
        Self {
            team: Some(team.into()),
            position: None,
        }
    }

    pub fn position(position: impl Into<String>) -> Self {
        Self {
            team: None,
            position: Some(position.into()),
        }
    }

    fn describe(&self) -> Option<String> {
        let parts: Vec<String> = [("team", &self.team), ("position", &self.position)]
            .into_iter()
            .filter_map(|(name, value)| value.as_deref().map(|v| format!("{name}={v}")))
            .collect();
        (!parts.is_empty()).then(|| parts.join(","))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSubject {
    pub id: String,
    pub name: String,
    pub league: String,
    pub team: Option<String>,
    pub position: Option<String>,
    pub jersey_number: Option<u32>,
}

impl ResolvedSubject {
    /// Store values win; input attributes only fill fields the record lacks.
    fn merge(subject: &Subject, team_hint: Option<String>, position_hint: Option<String>) -> Self {
        Self {
            id: subject.id.clone(),
            name: subject.name.clone(),
            league: subject.league.clone(),
            team: subject.team.clone().or(team_hint),
            position: subject.position.clone().or(position_hint),
            jersey_number: subject.jersey_number,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTeam {
    pub id: String,
    pub league: String,
    pub abbr_name: String,
    pub full_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMarket {
    pub id: String,
    pub name: String,
    pub sport: String,
    pub period: Option<String>,
}

pub struct Resolver {
    store: Arc<EntityStore>,
    reporter: Arc<Reporter>,
    matcher: Box<dyn SubjectMatcher>,
}

impl Resolver {
    pub fn new(store: Arc<EntityStore>, reporter: Arc<Reporter>) -> Self {
        Self {
            store,
            reporter,
            matcher: Box::new(LevenshteinMatcher::default()),
        }
    }

    pub fn with_matcher(mut self, matcher: Box<dyn SubjectMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    pub fn reporter(&self) -> &Arc<Reporter> {
        &self.reporter
    }

    pub fn resolve_league(&self, source: &str, raw: &str) -> Option<League> {
        let snapshot = self.store.snapshot();
        match snapshot.league_by_alias(raw) {
            Some(league) => Some(league.clone()),
            None => {
                self.reporter
                    .record_problem(EntityKind::League, source, "", &clean_league(raw), None);
                None
            }
        }
    }

    pub fn resolve_subject(
        &self,
        source: &str,
        league: &str,
        raw: &str,
        attrs: &SubjectAttrs,
    ) -> Option<ResolvedSubject> {
        let snapshot = self.store.snapshot();
        let league = league_code(&snapshot, league);
        let name_key = clean_subject(raw, &league);
        if name_key.is_empty() {
            self.reporter
                .record_problem(EntityKind::Subject, source, &league, raw.trim(), attrs.describe());
            return None;
        }

        // Only a team the store knows may fill the record; any spelling may scope the lookup.
        let known_team = attrs
            .team
            .as_deref()
            .and_then(|team| snapshot.team_by_alias(&league, team))
            .map(|team| team.abbr_name.clone());
        let team_scope = known_team.clone().or_else(|| {
            attrs
                .team
                .as_deref()
                .map(|team| team.trim().to_ascii_uppercase())
                .filter(|team| !team.is_empty())
        });
        let position_hint = attrs
            .position
            .as_deref()
            .map(clean_position)
            .filter(|p| !p.is_empty());

        let id = scoped_match(&snapshot, &league, &name_key, team_scope.as_deref(), position_hint.as_deref())
            .or_else(|| unscoped_match(&snapshot, &league, &name_key))
            .or_else(|| {
                self.matcher
                    .best_match(&name_key, snapshot.subject_candidates(&league))
                    .map(|hit| hit.id)
            });

        let Some(subject) = id.as_deref().and_then(|id| snapshot.subject(id)) else {
            self.reporter
                .record_problem(EntityKind::Subject, source, &league, &name_key, attrs.describe());
            return None;
        };
        self.reporter
            .record_relevant(EntityKind::Subject, source, &league, &name_key, &subject.id);
        Some(ResolvedSubject::merge(subject, known_team, position_hint))
    }

    pub fn resolve_team(&self, source: &str, league: &str, raw: &str) -> Option<ResolvedTeam> {
        let snapshot = self.store.snapshot();
        let league = league_code(&snapshot, league);
        let Some(team) = snapshot.team_by_alias(&league, raw) else {
            self.reporter
                .record_problem(EntityKind::Team, source, &league, &clean_team(raw, &league), None);
            return None;
        };
        self.reporter
            .record_relevant(EntityKind::Team, source, &league, &clean_team(raw, &league), &team.id);
        Some(ResolvedTeam {
            id: team.id.clone(),
            league: team.league.clone(),
            abbr_name: team.abbr_name.clone(),
            full_name: team.full_name.clone(),
        })
    }

    /// `period` overrides any period qualifier embedded in `raw`.
    pub fn resolve_market(
        &self,
        source: &str,
        league: &str,
        raw: &str,
        period: Option<&str>,
    ) -> Option<ResolvedMarket> {
        let snapshot = self.store.snapshot();
        let Some(league) = snapshot.league_by_alias(league) else {
            self.reporter.record_problem(
                EntityKind::Market,
                source,
                &clean_league(league),
                raw.trim(),
                Some("unknown league".to_string()),
            );
            return None;
        };
        let cleaned = clean_market(raw, &league.sport);
        let period = period.and_then(clean_period).or(cleaned.period);
        let display = match period.as_deref() {
            Some(p) => format!("{p} {}", cleaned.name),
            None => cleaned.name.clone(),
        };

        let Some(market) = snapshot.market_by_key(&league.sport, period.as_deref(), &cleaned.name) else {
            self.reporter
                .record_problem(EntityKind::Market, source, &league.code, &display, None);
            return None;
        };
        self.reporter
            .record_relevant(EntityKind::Market, source, &league.code, &display, &market.id);
        Some(ResolvedMarket {
            id: market.id.clone(),
            name: market.name.clone(),
            sport: market.sport.clone(),
            period: market.period.clone(),
        })
    }
}

fn league_code(snapshot: &EntitySnapshot, raw: &str) -> String {
    snapshot
        .league_by_alias(raw)
        .map(|l| l.code.clone())
        .unwrap_or_else(|| clean_league(raw))
}

fn scoped_match(
    snapshot: &EntitySnapshot,
    league: &str,
    name_key: &str,
    team: Option<&str>,
    position: Option<&str>,
) -> Option<String> {
    let scopes = team
        .map(SubjectScope::Team)
        .into_iter()
        .chain(position.map(SubjectScope::Position));
    for scope in scopes {
        if let Some(id) = pick(snapshot.subjects_scoped(league, scope, name_key), league, name_key) {
            return Some(id);
        }
    }
    None
}

fn unscoped_match(snapshot: &EntitySnapshot, league: &str, name_key: &str) -> Option<String> {
    pick(snapshot.subjects_by_name(league, name_key), league, name_key)
}

/// Ids arrive sorted, so the first one is a stable choice when a key is duplicated.
fn pick(ids: &[String], league: &str, name_key: &str) -> Option<String> {
    let first = ids.first()?;
    if ids.len() > 1 {
        warn!(
            league,
            name = name_key,
            candidates = ids.len(),
            picked = %first,
            "ambiguous subject match"
        );
    }
    Some(first.clone())
}

#[cfg(test)]
mod tests {
    use super::{Resolver, SubjectAttrs};
    use crate::entity_store::EntityStore;
    use crate::matcher::LevenshteinMatcher;
    use crate::model::{EntityKind, EntitySet, Market, Subject, Team};
    use crate::report::Reporter;
    use std::sync::Arc;

    fn subject(id: &str, name: &str, team: Option<&str>, position: Option<&str>) -> Subject {
        Subject {
            id: id.to_string(),
            name: name.to_string(),
            league: "NBA".to_string(),
            team: team.map(str::to_string),
            position: position.map(str::to_string),
            jersey_number: None,
        }
    }

    fn resolver() -> Resolver {
        let set = EntitySet {
            teams: vec![Team {
                id: "t-phx".to_string(),
                league: "NBA".to_string(),
                abbr_name: "PHX".to_string(),
                full_name: "Phoenix Suns".to_string(),
                aliases: vec!["PHO".to_string()],
            }],
            subjects: vec![
                subject("s1", "Marcus Morris", Some("PHX"), None),
                subject("s2", "Marcus Morris", Some("NYK"), None),
                subject("s3", "Kevin Durant", None, Some("F")),
                subject("s4", "Shai Gilgeous-Alexander", Some("OKC"), Some("G")),
            ],
            markets: vec![Market {
                id: "m1".to_string(),
                name: "Points".to_string(),
                sport: "Basketball".to_string(),
                period: None,
            }],
            ..EntitySet::default()
        };
        Resolver::new(
            Arc::new(EntityStore::from_set(set)),
            Arc::new(Reporter::new(["roster"])),
        )
    }

    #[test]
    fn team_alias_in_attrs_scopes_the_lookup() {
        let r = resolver();
        let hit = r
            .resolve_subject("book", "NBA", "Marcus Morris", &SubjectAttrs::team("PHO"))
            .expect("scoped");
        assert_eq!(hit.id, "s1");
        let hit = r
            .resolve_subject("book", "nba", "marcus morris", &SubjectAttrs::team("NYK"))
            .expect("scoped");
        assert_eq!(hit.id, "s2");
    }

    #[test]
    fn missing_attributes_are_filled_from_the_store() {
        let r = resolver();
        let hit = r
            .resolve_subject("book", "NBA", "Gilgeous-Alexander, Shai", &SubjectAttrs::default())
            .expect("reordered name");
        assert_eq!(hit.team.as_deref(), Some("OKC"));
        assert_eq!(hit.position.as_deref(), Some("G"));

        let hit = r
            .resolve_subject("book", "NBA", "Kevin Durant", &SubjectAttrs::team("PHX"))
            .expect("scoped miss falls back to league");
        assert_eq!(hit.id, "s3");
        assert_eq!(hit.team.as_deref(), Some("PHX"));
    }

    #[test]
    fn unknown_team_spellings_do_not_fill_the_record() {
        let r = resolver();
        let hit = r
            .resolve_subject("book", "NBA", "Kevin Durant", &SubjectAttrs::team("Seattle"))
            .expect("league-wide match");
        assert_eq!(hit.id, "s3");
        assert_eq!(hit.team, None);

        // Unknown spellings still scope against subjects stored with the same text.
        let hit = r
            .resolve_subject("book", "NBA", "Shai Gilgeous-Alexander", &SubjectAttrs::team("okc"))
            .expect("scoped");
        assert_eq!(hit.team.as_deref(), Some("OKC"));
    }

    #[test]
    fn spacing_differences_pass_but_typos_do_not() {
        let r = resolver();
        assert!(r
            .resolve_subject("book", "NBA", "Shai GilgeousAlexander", &SubjectAttrs::default())
            .is_some());
        assert!(r
            .resolve_subject("book", "NBA", "Kevin Duarnt", &SubjectAttrs::default())
            .is_none());
        assert_eq!(r.reporter().problem_count(), 1);

        let lenient = resolver().with_matcher(Box::new(LevenshteinMatcher::with_max_distance(2)));
        assert!(lenient
            .resolve_subject("book", "NBA", "Kevin Duarnt", &SubjectAttrs::default())
            .is_some());
    }

    #[test]
    fn reference_source_hits_are_not_relevant() {
        let r = resolver();
        r.resolve_team("roster", "NBA", "Phoenix Suns").expect("team");
        assert!(r.reporter().relevant().is_empty());
        r.resolve_team("book", "NBA", "PHO").expect("team");
        let relevant = r.reporter().relevant();
        assert_eq!(relevant.len(), 1);
        assert_eq!(relevant[0].0.kind, EntityKind::Team);
        assert_eq!(relevant[0].1.entity_id.as_deref(), Some("t-phx"));
    }

    #[test]
    fn market_needs_a_known_league_and_matching_period() {
        let r = resolver();
        assert_eq!(
            r.resolve_market("book", "basketball_nba", "PTS", None).map(|m| m.id),
            Some("m1".to_string())
        );
        assert!(r.resolve_market("book", "NBA", "Points", Some("1Q")).is_none());
        assert!(r.resolve_market("book", "XFL9", "Points", None).is_none());
        let problems = r.reporter().problems();
        assert_eq!(problems.len(), 2);
        assert!(problems.iter().any(|(k, _)| k.name == "1Q points"));
    }
}
