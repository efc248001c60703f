use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{CollectionAdapter, RawProposition, over_under};
use crate::http_cache::HttpCache;
use crate::http_client::build_client;

const DEFAULT_ODDS: f64 = 1.9;

/// Pick'em projections in `data`, the players they reference in `included`.
pub struct JsonFeedAdapter {
    name: String,
    url: String,
    client: Client,
    cache: Arc<HttpCache>,
}

impl JsonFeedAdapter {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        timeout: Duration,
        cache: Arc<HttpCache>,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            url: url.into(),
            client: build_client(timeout)?,
            cache,
        })
    }
}

impl CollectionAdapter for JsonFeedAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self) -> Result<Vec<RawProposition>> {
        let body = self
            .cache
            .fetch_json_cached(&self.client, &self.url, &[])
            .with_context(|| format!("fetch {} feed", self.name))?;
        parse_projections(&body, DEFAULT_ODDS)
    }
}

#[derive(Debug, Deserialize)]
struct FeedResponse {
    #[serde(default)]
    data: Vec<Value>,
    #[serde(default)]
    included: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct Projection {
    attributes: ProjectionAttributes,
    relationships: ProjectionRelationships,
}

#[derive(Debug, Deserialize)]
struct ProjectionAttributes {
    line_score: f64,
    stat_type: String,
    #[serde(default)]
    odds_type: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProjectionRelationships {
    new_player: RelationshipRef,
}

#[derive(Debug, Deserialize)]
struct RelationshipRef {
    data: ResourceId,
}

#[derive(Debug, Deserialize)]
struct ResourceId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Player {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    attributes: PlayerAttributes,
}

#[derive(Debug, Clone, Deserialize)]
struct PlayerAttributes {
    #[serde(alias = "display_name")]
    name: String,
    league: String,
    #[serde(default)]
    team: Option<String>,
    #[serde(default)]
    position: Option<String>,
    #[serde(default)]
    combo: bool,
}

/// Bad projections are skipped one by one; only a bad envelope fails the call.
pub fn parse_projections(body: &str, default_odds: f64) -> Result<Vec<RawProposition>> {
    let response: FeedResponse = serde_json::from_str(body).context("parse feed envelope")?;

    let players: HashMap<String, PlayerAttributes> = response
        .included
        .into_iter()
        .filter_map(|v| serde_json::from_value::<Player>(v).ok())
        .filter(|p| p.kind == "new_player")
        .map(|p| (p.id, p.attributes))
        .collect();

    let mut out = Vec::with_capacity(response.data.len());
    let mut skipped = 0usize;
    for value in response.data {
        let Ok(projection) = serde_json::from_value::<Projection>(value) else {
            skipped += 1;
            continue;
        };
        let attrs = projection.attributes;
        if attrs
            .odds_type
            .as_deref()
            .is_some_and(|t| !t.eq_ignore_ascii_case("standard"))
        {
            continue;
        }
        let Some(player) = players.get(&projection.relationships.new_player.data.id) else {
            skipped += 1;
            continue;
        };

        let (subject, team) = if player.combo {
            (None, Some(player.name.clone()))
        } else {
            (Some(player.name.clone()), player.team.clone())
        };
        out.push(RawProposition {
            league: player.league.clone(),
            subject,
            team,
            position: player.position.clone(),
            market: attrs.stat_type,
            period: None,
            line: attrs.line_score,
            outcomes: over_under(default_odds),
            metrics: Default::default(),
            collected_at: attrs
                .updated_at
                .as_deref()
                .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
                .map(|ts| ts.with_timezone(&Utc).timestamp()),
        });
    }
    if skipped > 0 {
        debug!(skipped, kept = out.len(), "feed rows skipped");
    }
    Ok(out)
}
