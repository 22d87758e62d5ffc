//! Game session: the aggregate root for one room.
//!
//! `GameSession` owns players, turn order, per-turn flags, the chance deck and the
//! random source. Every operation is synchronous and either fully applies or returns a
//! [`Rejection`] without touching state. Money movement, liquidation and bankruptcy live
//! in `economy.rs` as a second impl block on the same type.
//!
//! ## Turn machine
//!
//! ```text
//! AwaitingRoll --roll--> TileResolved --buy | auction | build--> ... --end_turn--> next AwaitingRoll
//! InJail       --end_turn (counter - 1)--> next player
//! InJail       --pay_jail_fine--> FinePaid (no roll this turn) --end_turn--> next player
//! ```

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use super::board::{Board, Money, Tile, TileId, TileKind};
use super::chance::{ChanceCard, ChanceDeck, ChanceEffect};
use super::errors::Rejection;
use super::player::{Account, Player, PlayerId};
use super::rent;
use crate::validation::{validate_color, validate_display_name};

/// Colors handed out at game start to players that never picked one.
pub const DEFAULT_COLORS: [&str; 8] = [
    "#00d2ff", "#ff4b81", "#f1c40f", "#2ecc71", "#9b59b6", "#e67e22", "#3498db", "#e74c3c",
];

/// Nested chance moves stop resolving after this many hops.
const MAX_CHANCE_CHAIN: u8 = 8;

/// Tunable economy and lobby constants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameRules {
    pub starting_money: Money,
    pub max_players: usize,
    pub min_players: usize,
    pub min_ready: usize,
    pub jail_fine: Money,
    pub jail_turns: u8,
    /// Largest share of a payer's total assets a single rent charge may take.
    pub rent_cap_percent: Money,
    /// Share of the building price refunded when a house or hotel is sold.
    pub sell_refund_percent: Money,
    pub max_name_chars: usize,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            starting_money: 1500,
            max_players: 8,
            min_players: 2,
            min_ready: 2,
            jail_fine: 100,
            jail_turns: 2,
            rent_cap_percent: 85,
            sell_refund_percent: 50,
            max_name_chars: 16,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnFlags {
    pub has_rolled: bool,
    pub has_bought: bool,
    pub has_started_auction: bool,
    pub paid_jail_fine: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceRoll {
    pub d1: u8,
    pub d2: u8,
    pub total: u32,
}

impl DiceRoll {
    pub fn new(d1: u8, d2: u8) -> Self {
        debug_assert!(
            (1..=6).contains(&d1) && (1..=6).contains(&d2),
            "dice faces out of range: {d1}, {d2}"
        );
        Self {
            d1,
            d2,
            total: u32::from(d1) + u32::from(d2),
        }
    }

    /// Two independent uniform dice.
    pub fn roll<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::new(rng.gen_range(1..=6), rng.gen_range(1..=6))
    }
}

/// What happened while a landing was resolved, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TileEvent {
    PassedStart {
        salary: Money,
    },
    Tax {
        amount: Money,
    },
    GotoJail,
    Chance {
        card: ChanceCard,
    },
    #[serde(rename_all = "camelCase")]
    UnownedProperty {
        property_id: TileId,
    },
    #[serde(rename_all = "camelCase")]
    RentPaid {
        to: PlayerId,
        amount: Money,
        property_id: TileId,
    },
    #[serde(rename_all = "camelCase")]
    Liquidated {
        player_id: PlayerId,
        property_ids: Vec<TileId>,
        raised: Money,
    },
    #[serde(rename_all = "camelCase")]
    Bankrupt {
        player_id: PlayerId,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollOutcome {
    pub dice: DiceRoll,
    pub tile: Tile,
    pub events: Vec<TileEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameOver {
    pub winner_id: PlayerId,
    pub winner_name: String,
    pub winner_color: Option<String>,
    pub winner_money: Money,
    pub winner_properties: usize,
}

/// Side effects the server broadcasts after an action, regardless of which action
/// produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    PlayerBankrupt {
        player_id: PlayerId,
        player_name: String,
    },
    GameOver(GameOver),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    pub player_id: PlayerId,
    pub reconnected: bool,
    /// Set when a reconnecting player asked for a color that could not be applied.
    pub color_rejected: Option<Rejection>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndTurnOutcome {
    pub player_id: PlayerId,
    /// Present when the player sat out a jail turn; 0 means released.
    pub jail_turns_remaining: Option<u8>,
    pub next_player: Option<PlayerId>,
}

#[derive(Debug)]
pub struct GameSession {
    pub(super) board: Board,
    pub(super) rules: GameRules,
    pub(super) players: BTreeMap<PlayerId, Player>,
    /// Join order in the lobby; fixed at start and pruned as players go bankrupt.
    pub(super) turn_order: Vec<PlayerId>,
    pub(super) current_turn: usize,
    pub(super) started: bool,
    pub(super) host_id: Option<PlayerId>,
    pub(super) ready: BTreeSet<PlayerId>,
    pub(super) deck: ChanceDeck,
    pub(super) flags: TurnFlags,
    pub(super) last_dice: Option<DiceRoll>,
    pub(super) game_over_reported: bool,
    pub(super) notices: Vec<SessionNotice>,
    pub(super) rng: StdRng,
}

impl GameSession {
    pub fn new(board: Board, rules: GameRules) -> Self {
        Self::with_rng(board, rules, StdRng::from_entropy())
    }

    /// Deterministic session for tests and replays.
    pub fn with_seed(board: Board, rules: GameRules, seed: u64) -> Self {
        Self::with_rng(board, rules, StdRng::seed_from_u64(seed))
    }

    pub(super) fn with_rng(board: Board, rules: GameRules, mut rng: StdRng) -> Self {
        let deck = ChanceDeck::shuffled(&mut rng);
        Self {
            board,
            rules,
            players: BTreeMap::new(),
            turn_order: Vec::new(),
            current_turn: 0,
            started: false,
            host_id: None,
            ready: BTreeSet::new(),
            deck,
            flags: TurnFlags::default(),
            last_dice: None,
            game_over_reported: false,
            notices: Vec::new(),
            rng,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.get(id)
    }

    /// Unchecked mutable access for tooling and tests. Game actions go through the
    /// validated operations instead.
    pub fn player_mut(&mut self, id: &str) -> Option<&mut Player> {
        self.players.get_mut(id)
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn turn_order(&self) -> &[PlayerId] {
        &self.turn_order
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn host_id(&self) -> Option<&PlayerId> {
        self.host_id.as_ref()
    }

    pub fn is_ready(&self, id: &str) -> bool {
        self.ready.contains(id)
    }

    pub fn flags(&self) -> TurnFlags {
        self.flags
    }

    pub fn last_dice(&self) -> Option<DiceRoll> {
        self.last_dice
    }

    pub fn current_player_id(&self) -> Option<&PlayerId> {
        self.turn_order.get(self.current_turn)
    }

    pub fn current_player(&self) -> Option<&Player> {
        self.current_player_id().and_then(|id| self.players.get(id))
    }

    pub fn is_current(&self, id: &str) -> bool {
        self.current_player_id().map(String::as_str) == Some(id)
    }

    /// Replace the chance deck, e.g. with a fixed order in tests.
    pub fn set_chance_deck(&mut self, deck: ChanceDeck) {
        self.deck = deck;
    }

    pub(super) fn mark_auction_started(&mut self) {
        self.flags.has_started_auction = true;
    }

    /// Drain bankruptcy and game-over notices accumulated since the last call.
    pub fn take_notices(&mut self) -> Vec<SessionNotice> {
        std::mem::take(&mut self.notices)
    }

    // ---- lobby -------------------------------------------------------------------------

    /// Join the room, or reattach to an existing player id.
    pub fn join(
        &mut self,
        name: &str,
        color: Option<&str>,
        existing_id: Option<&str>,
    ) -> Result<JoinOutcome, Rejection> {
        if let Some(id) = existing_id.filter(|id| self.players.contains_key(*id)) {
            let color_rejected = match color {
                Some(c) if !self.started => self.set_color(id, c).err(),
                _ => None,
            };
            return Ok(JoinOutcome {
                player_id: id.to_string(),
                reconnected: true,
                color_rejected,
            });
        }

        if self.started {
            return Err(Rejection::GameAlreadyStarted);
        }
        if self.players.len() >= self.rules.max_players {
            return Err(Rejection::GameFull);
        }
        let name = validate_display_name(name, self.rules.max_name_chars)
            .map_err(|_| Rejection::InvalidName)?;
        let color = match color {
            Some(c) => {
                let c = validate_color(c).map_err(|_| Rejection::InvalidColor)?;
                if self.color_in_use(&c, None) {
                    return Err(Rejection::ColorTaken);
                }
                Some(c)
            }
            None => None,
        };

        let id = Uuid::new_v4().to_string();
        let player = Player::new(&id, &name, color, self.rules.starting_money);
        self.players.insert(id.clone(), player);
        self.turn_order.push(id.clone());
        if self.host_id.is_none() {
            self.host_id = Some(id.clone());
        }
        log::info!(
            "Player joined: {} ({})",
            crate::logutil::escape_log(&name),
            id
        );
        Ok(JoinOutcome {
            player_id: id,
            reconnected: false,
            color_rejected: None,
        })
    }

    fn color_in_use(&self, color: &str, except: Option<&str>) -> bool {
        self.players
            .values()
            .any(|p| Some(p.id.as_str()) != except && p.color.as_deref() == Some(color))
    }

    pub fn set_color(&mut self, id: &str, color: &str) -> Result<String, Rejection> {
        if self.started {
            return Err(Rejection::GameAlreadyStarted);
        }
        if !self.players.contains_key(id) {
            return Err(Rejection::UnknownPlayer);
        }
        let color = validate_color(color).map_err(|_| Rejection::InvalidColor)?;
        if self.color_in_use(&color, Some(id)) {
            return Err(Rejection::ColorTaken);
        }
        if let Some(p) = self.players.get_mut(id) {
            p.color = Some(color.clone());
        }
        Ok(color)
    }

    pub fn set_ready(&mut self, id: &str, ready: bool) -> Result<(), Rejection> {
        if self.started {
            return Err(Rejection::GameAlreadyStarted);
        }
        if !self.players.contains_key(id) {
            return Err(Rejection::UnknownPlayer);
        }
        if ready {
            self.ready.insert(id.to_string());
        } else {
            self.ready.remove(id);
        }
        Ok(())
    }

    pub fn can_start(&self) -> bool {
        self.players.len() >= self.rules.min_players && self.ready.len() >= self.rules.min_ready
    }

    /// Start the game. Only the host may start, and only with enough ready players.
    pub fn start(&mut self, requester: &str) -> Result<(), Rejection> {
        if self.started {
            return Err(Rejection::GameAlreadyStarted);
        }
        if self.host_id.as_deref() != Some(requester) {
            return Err(Rejection::NotHost);
        }
        if !self.can_start() {
            return Err(Rejection::CannotStart);
        }

        self.assign_default_colors();
        self.started = true;
        self.current_turn = 0;
        self.flags = TurnFlags::default();
        self.last_dice = None;
        self.game_over_reported = false;
        log::info!("Game started with {} players", self.turn_order.len());
        Ok(())
    }

    fn assign_default_colors(&mut self) {
        let mut used: BTreeSet<String> = self
            .players
            .values()
            .filter_map(|p| p.color.clone())
            .collect();
        let mut palette = DEFAULT_COLORS.iter().cycle();
        for id in &self.turn_order {
            let Some(player) = self.players.get_mut(id) else {
                continue;
            };
            if player.color.is_some() {
                continue;
            }
            // Reuse the palette once every default color is taken
            let pick = palette
                .by_ref()
                .take(DEFAULT_COLORS.len())
                .find(|c| !used.contains(**c))
                .unwrap_or(&DEFAULT_COLORS[0]);
            used.insert(pick.to_string());
            player.color = Some(pick.to_string());
        }
    }

    /// Leave the lobby. Once the game has started players are never removed; their
    /// connection simply goes away.
    pub fn leave(&mut self, id: &str) -> Result<(), Rejection> {
        if self.started {
            return Err(Rejection::GameAlreadyStarted);
        }
        if self.players.remove(id).is_none() {
            return Err(Rejection::UnknownPlayer);
        }
        self.ready.remove(id);
        self.turn_order.retain(|p| p != id);
        if self.turn_order.is_empty() {
            self.reset_all();
            return Ok(());
        }
        if self.host_id.as_deref() == Some(id) {
            self.host_id = self.turn_order.first().cloned();
        }
        if self.current_turn >= self.turn_order.len() {
            self.current_turn = 0;
        }
        Ok(())
    }

    /// Host-forced reset of the whole room.
    pub fn reset(&mut self, requester: &str) -> Result<(), Rejection> {
        if self.host_id.as_deref() != Some(requester) {
            return Err(Rejection::NotHost);
        }
        self.reset_all();
        Ok(())
    }

    /// Drop every player and return to an empty lobby with a fresh deck.
    pub fn reset_all(&mut self) {
        self.players.clear();
        self.turn_order.clear();
        self.ready.clear();
        self.host_id = None;
        self.started = false;
        self.current_turn = 0;
        self.flags = TurnFlags::default();
        self.last_dice = None;
        self.game_over_reported = false;
        self.notices.clear();
        self.deck = ChanceDeck::shuffled(&mut self.rng);
        log::info!("Session reset");
    }

    // ---- turn machine ------------------------------------------------------------------

    /// Started game, known player, not bankrupt.
    pub(super) fn require_active(&self, id: &str) -> Result<&Player, Rejection> {
        if !self.started {
            return Err(Rejection::GameNotStarted);
        }
        let player = self.players.get(id).ok_or(Rejection::UnknownPlayer)?;
        if player.bankrupt {
            return Err(Rejection::PlayerBankrupt);
        }
        Ok(player)
    }

    /// As [`Self::require_active`], and it must be this player's turn.
    pub(super) fn require_turn(&self, id: &str) -> Result<&Player, Rejection> {
        let player = self.require_active(id)?;
        if !self.is_current(id) {
            return Err(Rejection::NotYourTurn);
        }
        Ok(player)
    }

    fn check_can_roll(&self, id: &str) -> Result<(), Rejection> {
        let player = self.require_turn(id)?;
        if self.flags.has_rolled {
            return Err(Rejection::AlreadyRolled);
        }
        if player.in_jail {
            return Err(Rejection::InJail);
        }
        if self.flags.paid_jail_fine {
            return Err(Rejection::FinePaidThisTurn);
        }
        Ok(())
    }

    /// Roll two dice for the current player, move and resolve the landing.
    pub fn roll_and_move(&mut self, id: &str) -> Result<RollOutcome, Rejection> {
        self.check_can_roll(id)?;
        let dice = DiceRoll::roll(&mut self.rng);
        self.apply_roll(id, dice)
    }

    /// Same as [`Self::roll_and_move`] with caller-supplied dice.
    pub fn apply_roll(&mut self, id: &str, dice: DiceRoll) -> Result<RollOutcome, Rejection> {
        self.check_can_roll(id)?;
        self.last_dice = Some(dice);
        self.flags.has_rolled = true;

        let mut events = Vec::new();
        let landed = self
            .move_player(id, i64::from(dice.total), &mut events)
            .ok_or(Rejection::UnknownPlayer)?;
        let tile = self
            .board
            .tile(landed)
            .cloned()
            .ok_or(Rejection::InvalidProperty)?;
        self.resolve_tile(id, landed, dice.total, &mut events, 0);
        log::debug!(
            "{} rolled {}+{} and landed on {} ({})",
            id,
            dice.d1,
            dice.d2,
            tile.id,
            tile.name
        );
        Ok(RollOutcome { dice, tile, events })
    }

    /// Move a player by `delta` tiles. Forward moves pay salary once for every pass over
    /// the start tile; backward moves never do. Returns the new position.
    pub fn move_player(
        &mut self,
        id: &str,
        delta: i64,
        events: &mut Vec<TileEvent>,
    ) -> Option<TileId> {
        let len = self.board.len() as i64;
        let salary = self.board.salary();
        let player = self.players.get_mut(id)?;
        let raw = player.position as i64 + delta;
        let wraps = if raw > 0 { raw / len } else { 0 };
        let position = raw.rem_euclid(len) as TileId;
        player.position = position;

        for _ in 0..wraps {
            self.transfer(&Account::Bank, &Account::player(id), salary);
            events.push(TileEvent::PassedStart { salary });
        }
        Some(position)
    }

    pub(super) fn send_to_jail(&mut self, id: &str) {
        let jail = self.board.jail_tile();
        let turns = self.rules.jail_turns;
        if let Some(p) = self.players.get_mut(id) {
            p.in_jail = true;
            p.jail_turns = turns;
            p.position = jail;
            log::info!("{} sent to jail", id);
        }
    }

    fn resolve_tile(
        &mut self,
        id: &str,
        tile_id: TileId,
        dice_total: u32,
        events: &mut Vec<TileEvent>,
        depth: u8,
    ) {
        let Some(kind) = self.board.tile(tile_id).map(|t| t.kind.clone()) else {
            return;
        };
        match kind {
            TileKind::Tax { amount } => {
                events.push(TileEvent::Tax { amount });
                self.settle(id, &Account::Bank, amount, events);
            }
            TileKind::GoToJail => {
                self.send_to_jail(id);
                events.push(TileEvent::GotoJail);
            }
            TileKind::Chance => {
                if let Some(card) = self.deck.draw(&mut self.rng) {
                    events.push(TileEvent::Chance { card: card.clone() });
                    self.apply_chance(id, &card, dice_total, events, depth);
                }
            }
            TileKind::Property { .. } | TileKind::Airport { .. } | TileKind::Utility { .. } => {
                self.resolve_ownable(id, tile_id, dice_total, events);
            }
            TileKind::Start { .. }
            | TileKind::CommunityChest
            | TileKind::Jail
            | TileKind::FreeParking => {}
        }
    }

    fn apply_chance(
        &mut self,
        id: &str,
        card: &ChanceCard,
        dice_total: u32,
        events: &mut Vec<TileEvent>,
        depth: u8,
    ) {
        match card.effect {
            ChanceEffect::Money { amount } if amount >= 0 => {
                self.transfer(&Account::Bank, &Account::player(id), amount);
            }
            ChanceEffect::Money { amount } => {
                self.settle(id, &Account::Bank, -amount, events);
            }
            ChanceEffect::Move { delta } => {
                if depth >= MAX_CHANCE_CHAIN {
                    log::warn!("chance chain too deep at depth {}, not resolving move", depth);
                    return;
                }
                if let Some(position) = self.move_player(id, i64::from(delta), events) {
                    self.resolve_tile(id, position, dice_total, events, depth + 1);
                }
            }
            ChanceEffect::GoToJail => {
                self.send_to_jail(id);
                events.push(TileEvent::GotoJail);
            }
        }
    }

    fn resolve_ownable(
        &mut self,
        id: &str,
        tile_id: TileId,
        dice_total: u32,
        events: &mut Vec<TileEvent>,
    ) {
        let Some(owner) = self.owner_of(tile_id).cloned() else {
            events.push(TileEvent::UnownedProperty {
                property_id: tile_id,
            });
            return;
        };
        if owner == id {
            return;
        }
        let due = match self.players.get(&owner) {
            Some(o) if !o.bankrupt => rent::rent(&self.board, tile_id, o, dice_total),
            _ => 0,
        };
        if due > 0 {
            self.charge_rent(id, &owner, tile_id, due, events);
        }
    }

    /// Finish the current player's turn and pass it on.
    pub fn end_turn(&mut self, id: &str) -> Result<EndTurnOutcome, Rejection> {
        let player = self.require_turn(id)?;
        let in_jail = player.in_jail;
        if !in_jail && !self.flags.has_rolled && !self.flags.paid_jail_fine {
            return Err(Rejection::MustRollFirst);
        }

        let mut jail_turns_remaining = None;
        if in_jail {
            if let Some(p) = self.players.get_mut(id) {
                p.jail_turns = p.jail_turns.saturating_sub(1);
                if p.jail_turns == 0 {
                    p.in_jail = false;
                }
                jail_turns_remaining = Some(p.jail_turns);
            }
        }

        self.flags = TurnFlags::default();
        if !self.turn_order.is_empty() {
            self.current_turn = (self.current_turn + 1) % self.turn_order.len();
        }
        Ok(EndTurnOutcome {
            player_id: id.to_string(),
            jail_turns_remaining,
            next_player: self.current_player_id().cloned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::chance::base_cards;

    fn started(names: &[&str]) -> (GameSession, Vec<PlayerId>) {
        let mut s = GameSession::with_seed(Board::default(), GameRules::default(), 42);
        let ids: Vec<PlayerId> = names
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
    fn salary_paid_once_per_wrap() {
        let (mut s, ids) = started(&["Ada", "Bob"]);
        for (start, delta) in [(0i64, 39i64), (35, 12), (10, 80), (39, 1), (0, 120)] {
            let p = s.player_mut(&ids[0]).unwrap();
            p.position = start as TileId;
            p.money = 0;
            let mut events = Vec::new();
            let pos = s.move_player(&ids[0], delta, &mut events).unwrap();
            let expected_wraps = (start + delta) / 40 - start / 40;
            assert_eq!(pos as i64, (start + delta) % 40);
            assert_eq!(s.player(&ids[0]).unwrap().money, 200 * expected_wraps);
            assert_eq!(events.len() as i64, expected_wraps);
        }
    }

    #[test]
    fn backward_move_never_pays_salary() {
        let (mut s, ids) = started(&["Ada", "Bob"]);
        s.player_mut(&ids[0]).unwrap().position = 1;
        let mut events = Vec::new();
        assert_eq!(s.move_player(&ids[0], -3, &mut events), Some(38));
        assert_eq!(s.player(&ids[0]).unwrap().money, 1500);
        assert!(events.is_empty());
    }

    #[test]
    fn roll_is_gated_by_turn_and_flags() {
        let (mut s, ids) = started(&["Ada", "Bob"]);
        assert_eq!(
            s.apply_roll(&ids[1], DiceRoll::new(1, 2)).unwrap_err(),
            Rejection::NotYourTurn
        );
        s.apply_roll(&ids[0], DiceRoll::new(1, 2)).unwrap();
        assert_eq!(
            s.apply_roll(&ids[0], DiceRoll::new(1, 2)).unwrap_err(),
            Rejection::AlreadyRolled
        );
        assert_eq!(s.end_turn(&ids[1]).unwrap_err(), Rejection::NotYourTurn);
        let out = s.end_turn(&ids[0]).unwrap();
        assert_eq!(out.next_player.as_deref(), Some(ids[1].as_str()));
        assert_eq!(s.flags(), TurnFlags::default());
        assert_eq!(s.end_turn(&ids[1]).unwrap_err(), Rejection::MustRollFirst);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "dice faces out of range")]
    fn impossible_dice_are_caught() {
        let _ = DiceRoll::new(0, 7);
    }

    #[test]
    fn rolled_dice_stay_on_the_faces() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let dice = DiceRoll::roll(&mut rng);
            assert!((2..=12).contains(&dice.total));
        }
    }

    #[test]
    fn go_to_jail_then_sit_out_two_turns() {
        let (mut s, ids) = started(&["Ada", "Bob"]);
        s.player_mut(&ids[0]).unwrap().position = 20;
        let out = s.apply_roll(&ids[0], DiceRoll::new(4, 6)).unwrap();
        assert!(out.events.contains(&TileEvent::GotoJail));
        let ada = s.player(&ids[0]).unwrap();
        assert!(ada.in_jail);
        assert_eq!(ada.position, 10);
        assert_eq!(ada.jail_turns, 2);

        s.end_turn(&ids[0]).unwrap();
        s.apply_roll(&ids[1], DiceRoll::new(1, 2)).unwrap();
        s.end_turn(&ids[1]).unwrap();

        assert_eq!(
            s.apply_roll(&ids[0], DiceRoll::new(1, 1)).unwrap_err(),
            Rejection::InJail
        );
        let out = s.end_turn(&ids[0]).unwrap();
        assert_eq!(out.jail_turns_remaining, Some(1));
        s.apply_roll(&ids[1], DiceRoll::new(1, 2)).unwrap();
        s.end_turn(&ids[1]).unwrap();
        let out = s.end_turn(&ids[0]).unwrap();
        assert_eq!(out.jail_turns_remaining, Some(0));
        assert!(!s.player(&ids[0]).unwrap().in_jail);
    }

    #[test]
    fn tax_is_paid_to_the_bank() {
        let (mut s, ids) = started(&["Ada", "Bob"]);
        let out = s.apply_roll(&ids[0], DiceRoll::new(1, 3)).unwrap();
        assert_eq!(out.tile.id, 4);
        assert_eq!(out.events, vec![TileEvent::Tax { amount: 200 }]);
        assert_eq!(s.player(&ids[0]).unwrap().money, 1300);
    }

    #[test]
    fn chance_move_resolves_the_new_tile() {
        let (mut s, ids) = started(&["Ada", "Bob"]);
        let cards: Vec<ChanceCard> = base_cards().into_iter().filter(|c| c.id == "fwd3").collect();
        s.set_chance_deck(ChanceDeck::ordered(cards));
        // 0 + 7 = Surprise at 7, forward 3 lands on jail (just visiting)
        let out = s.apply_roll(&ids[0], DiceRoll::new(3, 4)).unwrap();
        assert_eq!(out.tile.id, 7);
        assert!(matches!(out.events[0], TileEvent::Chance { .. }));
        assert_eq!(s.player(&ids[0]).unwrap().position, 10);
        assert!(!s.player(&ids[0]).unwrap().in_jail);
    }

    #[test]
    fn unowned_property_is_reported() {
        let (mut s, ids) = started(&["Ada", "Bob"]);
        let out = s.apply_roll(&ids[0], DiceRoll::new(3, 3)).unwrap();
        assert_eq!(out.events, vec![TileEvent::UnownedProperty { property_id: 6 }]);
    }

    #[test]
    fn lobby_rules() {
        let mut s = GameSession::with_seed(Board::default(), GameRules::default(), 1);
        let host = s.join("Host", Some("#00D2FF"), None).unwrap().player_id;
        assert_eq!(s.host_id(), Some(&host));
        assert_eq!(
            s.join("Copy", Some("#00d2ff"), None).unwrap_err(),
            Rejection::ColorTaken
        );
        assert_eq!(s.join("   ", None, None).unwrap_err(), Rejection::InvalidName);
        let guest = s.join("Guest", None, None).unwrap().player_id;
        assert_eq!(s.start(&guest).unwrap_err(), Rejection::NotHost);
        s.set_ready(&host, true).unwrap();
        assert_eq!(s.start(&host).unwrap_err(), Rejection::CannotStart);
        s.set_ready(&guest, true).unwrap();
        s.start(&host).unwrap();
        assert_eq!(s.player(&guest).unwrap().color.as_deref(), Some("#ff4b81"));
        assert_eq!(
            s.join("Late", None, None).unwrap_err(),
            Rejection::GameAlreadyStarted
        );
        let back = s.join("ignored", None, Some(&guest)).unwrap();
        assert!(back.reconnected);
        assert_eq!(back.player_id, guest);
    }

    #[test]
    fn lobby_is_capped_and_host_moves_on_leave() {
        let mut s = GameSession::with_seed(Board::default(), GameRules::default(), 1);
        let ids: Vec<PlayerId> = (0..8)
            .map(|i| s.join(&format!("P{i}"), None, None).unwrap().player_id)
            .collect();
        assert_eq!(s.join("Ninth", None, None).unwrap_err(), Rejection::GameFull);
        s.leave(&ids[0]).unwrap();
        assert_eq!(s.host_id(), Some(&ids[1]));
        assert_eq!(s.player_count(), 7);
        for id in &ids[1..] {
            s.leave(id).unwrap();
        }
        assert_eq!(s.player_count(), 0);
        assert!(s.host_id().is_none());
    }
}
