use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clean::clean_league;
use crate::entity_store::EntityStore;
use crate::model::{EntityKind, GameStatus};
use crate::report::Reporter;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedGame {
    pub id: String,
    pub game_time: String,
    pub info: String,
    pub home_team: String,
    pub away_team: String,
    pub status: GameStatus,
}

pub struct GameResolver {
    store: Arc<EntityStore>,
    reporter: Arc<Reporter>,
}

impl GameResolver {
    pub fn new(store: Arc<EntityStore>, reporter: Arc<Reporter>) -> Self {
        Self { store, reporter }
    }

    pub fn find_game(&self, source: &str, league: &str, team_abbr: &str) -> Option<ResolvedGame> {
        let snapshot = self.store.snapshot();
        let league = snapshot
            .league_by_alias(league)
            .map(|l| l.code.clone())
            .unwrap_or_else(|| clean_league(league));
        let Some(game) = snapshot.game_for_team(&league, team_abbr) else {
            debug!(source, league = %league, team = team_abbr, "no active game for team");
            return None;
        };
        self.reporter
            .record_relevant(EntityKind::Game, source, &league, &game.info, &game.id);
        Some(ResolvedGame {
            id: game.id.clone(),
            game_time: game.game_time.clone(),
            info: game.info.clone(),
            home_team: game.home_team.clone(),
            away_team: game.away_team.clone(),
            status: game.status,
        })
    }
}
