use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct League {
    pub code: String,
    pub sport: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub league: String,
    pub abbr_name: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub league: String,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub jersey_number: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    pub id: String,
    pub name: String,
    pub sport: String,
    #[serde(default)]
    pub period: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    #[default]
    Scheduled,
    Live,
    Completed,
}

impl GameStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GameStatus::Scheduled => "scheduled",
            GameStatus::Live => "live",
            GameStatus::Completed => "completed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "scheduled" | "upcoming" | "pre" => Some(GameStatus::Scheduled),
            "live" | "in_progress" | "inprogress" => Some(GameStatus::Live),
            "completed" | "final" | "finished" => Some(GameStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub id: String,
    pub league: String,
    pub home_team: String,
    pub away_team: String,
    pub game_time: String,
    #[serde(default)]
    pub info: String,
    #[serde(default)]
    pub status: GameStatus,
}

impl Game {
    pub fn is_active(&self) -> bool {
        self.status != GameStatus::Completed
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntitySet {
    #[serde(default)]
    pub leagues: Vec<League>,
    #[serde(default)]
    pub teams: Vec<Team>,
    #[serde(default)]
    pub subjects: Vec<Subject>,
    #[serde(default)]
    pub markets: Vec<Market>,
    #[serde(default)]
    pub games: Vec<Game>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    League,
    Team,
    Subject,
    Market,
    Game,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::League => "league",
            EntityKind::Team => "team",
            EntityKind::Subject => "subject",
            EntityKind::Market => "market",
            EntityKind::Game => "game",
        }
    }
}
