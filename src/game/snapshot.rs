//! Serialized forms of a session: the persisted [`SessionSnapshot`] and the
//! [`StateView`] broadcast to clients after every state change.

use chrono::{DateTime, SubsecRound, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::board::Board;
use super::chance::ChanceDeck;
use super::player::{Player, PlayerId};
use super::state::{DiceRoll, GameRules, GameSession, TurnFlags};

pub const SNAPSHOT_VERSION: u32 = 1;

/// Everything needed to bring a session back after a restart. The board comes from
/// configuration, and live auctions and trade offers are not kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub version: u32,
    pub players: BTreeMap<PlayerId, Player>,
    pub turn_order: Vec<PlayerId>,
    pub current_turn_index: usize,
    pub started: bool,
    pub host_id: Option<PlayerId>,
    pub ready_players: BTreeSet<PlayerId>,
    pub chance_deck: ChanceDeck,
    pub turn_flags: TurnFlags,
    pub last_dice: Option<DiceRoll>,
    #[serde(default)]
    pub game_over_reported: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub saved_at: DateTime<Utc>,
}

/// Full state broadcast after any state-changing action.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateView<'a> {
    pub players: &'a BTreeMap<PlayerId, Player>,
    pub turn_order: &'a [PlayerId],
    pub current_player_id: Option<&'a PlayerId>,
    pub started: bool,
    pub host_id: Option<&'a PlayerId>,
    pub board: &'a Board,
    pub last_dice: Option<DiceRoll>,
    pub turn_flags: TurnFlags,
    pub ready_players: Vec<&'a PlayerId>,
}

impl GameSession {
    pub fn view(&self) -> StateView<'_> {
        StateView {
            players: &self.players,
            turn_order: &self.turn_order,
            current_player_id: self.current_player_id(),
            started: self.started,
            host_id: self.host_id.as_ref(),
            board: &self.board,
            last_dice: self.last_dice,
            turn_flags: self.flags,
            ready_players: self.ready.iter().collect(),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            version: SNAPSHOT_VERSION,
            players: self.players.clone(),
            turn_order: self.turn_order.clone(),
            current_turn_index: self.current_turn,
            started: self.started,
            host_id: self.host_id.clone(),
            ready_players: self.ready.clone(),
            chance_deck: self.deck.clone(),
            turn_flags: self.flags,
            last_dice: self.last_dice,
            game_over_reported: self.game_over_reported,
            saved_at: Utc::now().trunc_subsecs(3),
        }
    }

    /// Rebuild a session from a snapshot. References to players that no longer exist
    /// are dropped and the turn index is clamped, so a hand-edited or partially written
    /// snapshot still yields a consistent session.
    pub fn restore(board: Board, rules: GameRules, snapshot: SessionSnapshot) -> Self {
        let mut session = Self::with_rng(board, rules, StdRng::from_entropy());
        let players = snapshot.players;
        let board_len = session.board.len();

        session.turn_order = snapshot
            .turn_order
            .into_iter()
            .filter(|id| players.get(id).map(|p| !p.bankrupt).unwrap_or(false))
            .collect();
        session.ready = snapshot
            .ready_players
            .into_iter()
            .filter(|id| players.contains_key(id))
            .collect();
        session.host_id = snapshot
            .host_id
            .filter(|id| players.contains_key(id))
            .or_else(|| session.turn_order.first().cloned());
        session.players = players;
        for p in session.players.values_mut() {
            if p.position >= board_len {
                p.position = 0;
            }
            p.owned_properties
                .retain(|tile, _| session.board.tile(*tile).map(|t| t.is_purchasable()).unwrap_or(false));
        }
        session.current_turn = if session.turn_order.is_empty() {
            0
        } else {
            snapshot.current_turn_index % session.turn_order.len()
        };
        session.started = snapshot.started;
        session.deck = snapshot.chance_deck;
        session.flags = snapshot.turn_flags;
        session.last_dice = snapshot.last_dice;
        session.game_over_reported = snapshot.game_over_reported;
        session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::player::Development;

    fn started() -> (GameSession, Vec<PlayerId>) {
        let mut s = GameSession::with_seed(Board::default(), GameRules::default(), 11);
        let ids: Vec<PlayerId> = ["Ada", "Bob"]
            .iter()
            .map(|n| s.join(n, None, None).unwrap().player_id)
            .collect();
        for id in &ids {
            s.set_ready(id, true).unwrap();
        }
        s.start(&ids[0]).unwrap();
        (s, ids)
    }

    #[test]
    fn snapshot_restores_game_state() {
        let (mut s, ids) = started();
        s.buy_property(&ids[0], 1).unwrap();
        s.apply_roll(&ids[0], DiceRoll::new(2, 3)).unwrap();
        let snap = s.snapshot();
        let json = serde_json::to_string(&snap).unwrap();
        let back: SessionSnapshot = serde_json::from_str(&json).unwrap();

        let restored = GameSession::restore(Board::default(), GameRules::default(), back);
        assert_eq!(restored.player(&ids[0]), s.player(&ids[0]));
        assert_eq!(restored.turn_order(), s.turn_order());
        assert_eq!(restored.current_player_id(), s.current_player_id());
        assert_eq!(restored.flags(), s.flags());
        assert_eq!(restored.last_dice(), Some(DiceRoll::new(2, 3)));
        assert!(restored.is_started());
        assert_eq!(restored.host_id(), Some(&ids[0]));
    }

    #[test]
    fn restore_drops_dangling_references() {
        let (s, ids) = started();
        let mut snap = s.snapshot();
        snap.turn_order.push("ghost".to_string());
        snap.current_turn_index = 7;
        snap.host_id = Some("ghost".to_string());
        if let Some(p) = snap.players.get_mut(&ids[1]) {
            p.owned_properties.insert(2, Development::Land);
            p.position = 99;
        }
        let restored = GameSession::restore(Board::default(), GameRules::default(), snap);
        assert_eq!(restored.turn_order(), &ids[..]);
        assert_eq!(restored.current_player_id(), Some(&ids[1]));
        assert_eq!(restored.host_id(), Some(&ids[0]));
        let bob = restored.player(&ids[1]).unwrap();
        assert_eq!(bob.position, 0);
        assert!(!bob.owns(2));
    }

    #[test]
    fn view_has_broadcast_shape() {
        let (s, ids) = started();
        let json = serde_json::to_value(s.view()).unwrap();
        assert_eq!(json["currentPlayerId"], ids[0].as_str());
        assert_eq!(json["started"], true);
        assert_eq!(json["board"].as_array().unwrap().len(), 40);
        assert_eq!(json["turnFlags"]["hasRolled"], false);
        assert_eq!(json["readyPlayers"].as_array().unwrap().len(), 2);
        assert!(json["players"][ids[1].as_str()]["money"].is_number());
    }
}
