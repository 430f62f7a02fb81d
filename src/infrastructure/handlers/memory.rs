//! In-memory collaborator implementations.
//!
//! State lives only for the lifetime of the process. The binary wires these
//! in when no external game service is configured.

use std::collections::BTreeSet;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Map, Value};

use crate::domain::services::{
    EnvironmentalImpactHandler, GameActionOutcome, GameStateHandler, HandlerError, PlayerState,
    TeamActionHandler, TeamActionOutcome,
};
use crate::domain::value_objects::{TeamId, UserId};

/// Per-player JSON state merged from each action's payload.
#[derive(Debug, Default)]
pub struct InMemoryGameState {
    players: DashMap<UserId, Map<String, Value>>,
    teams: DashMap<UserId, TeamId>,
}

impl InMemoryGameState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_team(&self, user_id: UserId, team_id: TeamId) {
        self.teams.insert(user_id, team_id);
    }
}

#[async_trait]
impl GameStateHandler for InMemoryGameState {
    async fn process(&self, user_id: &UserId, payload: Value) -> Result<GameActionOutcome, HandlerError> {
        let Value::Object(fields) = payload else {
            return Err(HandlerError::Rejected("game action must be an object".into()));
        };

        let state = {
            let mut player = self.players.entry(user_id.clone()).or_default();
            player.extend(fields);
            Value::Object(player.clone())
        };

        Ok(GameActionOutcome {
            affected_users: vec![user_id.clone()],
            new_state: json!({ "userId": user_id, "state": state }),
        })
    }

    async fn player_state(&self, user_id: &UserId) -> Result<PlayerState, HandlerError> {
        let state = self
            .players
            .get(user_id)
            .map(|player| Value::Object(player.clone()))
            .unwrap_or_else(|| json!({}));
        Ok(PlayerState {
            team_id: self.teams.get(user_id).map(|team| team.clone()),
            state,
        })
    }
}

/// Running total of reported impact per player.
#[derive(Debug, Default)]
pub struct InMemoryImpactLedger {
    totals: DashMap<UserId, f64>,
}

impl InMemoryImpactLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EnvironmentalImpactHandler for InMemoryImpactLedger {
    async fn track(&self, user_id: &UserId, payload: Value) -> Result<Value, HandlerError> {
        let amount = payload
            .get("amount")
            .and_then(Value::as_f64)
            .ok_or_else(|| HandlerError::Rejected("amount must be a number".into()))?;

        let total = {
            let mut total = self.totals.entry(user_id.clone()).or_insert(0.0);
            *total += amount;
            *total
        };
        Ok(json!({ "amount": amount, "total": total }))
    }
}

/// Team roster keyed by team id.
#[derive(Debug, Default)]
pub struct InMemoryTeams {
    rosters: DashMap<TeamId, BTreeSet<UserId>>,
}

impl InMemoryTeams {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TeamActionHandler for InMemoryTeams {
    async fn process(&self, user_id: &UserId, payload: Value) -> Result<TeamActionOutcome, HandlerError> {
        let team_id = payload
            .get("teamId")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(TeamId::from)
            .ok_or_else(|| HandlerError::Rejected("teamId is required".into()))?;

        for mut roster in self.rosters.iter_mut() {
            roster.remove(user_id);
        }
        self.rosters.retain(|_, roster| !roster.is_empty());

        let members: Vec<UserId> = {
            let mut roster = self.rosters.entry(team_id.clone()).or_default();
            roster.insert(user_id.clone());
            roster.iter().cloned().collect()
        };

        Ok(TeamActionOutcome {
            team_id: Some(team_id.clone()),
            team_state: json!({ "teamId": team_id, "members": members }),
        })
    }
}
