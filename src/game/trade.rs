//! Pairwise trade offers.
//!
//! A proposal moves nothing. Acceptance re-validates ownership and funds against the
//! state at that moment and either applies every leg or none of them; a failed acceptance
//! discards the offer. Counter-offers are a reject followed by a fresh proposal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::board::{Money, TileId};
use super::errors::Rejection;
use super::player::{Account, PlayerId};
use super::state::GameSession;

/// Terms as submitted by the proposer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeTerms {
    pub to_player_id: PlayerId,
    #[serde(default)]
    pub offer_money: Money,
    #[serde(default)]
    pub request_money: Money,
    #[serde(default)]
    pub offer_properties: Vec<TileId>,
    #[serde(default)]
    pub request_properties: Vec<TileId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: String,
    pub from_player_id: PlayerId,
    pub to_player_id: PlayerId,
    /// Paid by the proposer to the counterparty.
    pub offer_money: Money,
    /// Paid by the counterparty to the proposer.
    pub request_money: Money,
    pub offer_properties: Vec<TileId>,
    pub request_properties: Vec<TileId>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl Trade {
    pub fn involves(&self, id: &str) -> bool {
        self.from_player_id == id || self.to_player_id == id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Accepted,
    Rejected,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptOutcome {
    Settled(Trade),
    /// Terms no longer held at acceptance time; the offer was discarded.
    Failed(Trade, Rejection),
}

#[derive(Debug, Default)]
pub struct TradeDesk {
    trades: BTreeMap<String, Trade>,
}

impl TradeDesk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Trade> {
        self.trades.get(id)
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    pub fn pending_for<'a>(&'a self, player: &'a str) -> impl Iterator<Item = &'a Trade> + 'a {
        self.trades.values().filter(move |t| t.involves(player))
    }

    /// Record a new offer from `from`. Nothing changes hands yet.
    pub fn propose(
        &mut self,
        session: &GameSession,
        from: &str,
        terms: TradeTerms,
        now: DateTime<Utc>,
    ) -> Result<Trade, Rejection> {
        session.require_active(from)?;
        if terms.to_player_id == from {
            return Err(Rejection::InvalidTrade);
        }
        if terms.offer_money < 0 || terms.request_money < 0 {
            return Err(Rejection::InvalidTrade);
        }

        let mut offer = terms.offer_properties;
        offer.sort_unstable();
        offer.dedup();
        let mut request = terms.request_properties;
        request.sort_unstable();
        request.dedup();
        if offer.iter().any(|t| request.contains(t)) {
            return Err(Rejection::InvalidTrade);
        }
        if offer.is_empty() && request.is_empty() && terms.offer_money == 0 && terms.request_money == 0
        {
            return Err(Rejection::InvalidTrade);
        }
        let all_ownable = offer.iter().chain(request.iter()).all(|t| {
            session
                .board()
                .tile(*t)
                .map(|tile| tile.is_purchasable())
                .unwrap_or(false)
        });
        if !all_ownable {
            return Err(Rejection::InvalidProperty);
        }

        let trade = Trade {
            id: Uuid::new_v4().to_string(),
            from_player_id: from.to_string(),
            to_player_id: terms.to_player_id,
            offer_money: terms.offer_money,
            request_money: terms.request_money,
            offer_properties: offer,
            request_properties: request,
            created_at: now,
        };
        validate(session, &trade)?;
        self.trades.insert(trade.id.clone(), trade.clone());
        log::info!(
            "Trade {} proposed by {} to {}",
            trade.id,
            trade.from_player_id,
            trade.to_player_id
        );
        Ok(trade)
    }

    /// Accept an offer as its counterparty. Errors mean nothing happened; a `Failed`
    /// outcome means the offer was discarded because its terms no longer hold.
    pub fn accept(
        &mut self,
        session: &mut GameSession,
        trade_id: &str,
        player: &str,
    ) -> Result<AcceptOutcome, Rejection> {
        let trade = self.trades.get(trade_id).ok_or(Rejection::TradeNotFound)?;
        if trade.to_player_id != player {
            return Err(Rejection::NotTradeParty);
        }
        let Some(trade) = self.trades.remove(trade_id) else {
            return Err(Rejection::TradeNotFound);
        };

        if let Err(reason) = validate(session, &trade) {
            log::info!("Trade {} failed at acceptance: {}", trade.id, reason);
            return Ok(AcceptOutcome::Failed(trade, reason));
        }

        let proposer = trade.from_player_id.as_str();
        let acceptor = trade.to_player_id.as_str();
        move_deeds(session, &trade.offer_properties, proposer, acceptor);
        move_deeds(session, &trade.request_properties, acceptor, proposer);
        session.transfer(
            &Account::player(proposer),
            &Account::player(acceptor),
            trade.offer_money,
        );
        session.transfer(
            &Account::player(acceptor),
            &Account::player(proposer),
            trade.request_money,
        );
        log::info!(
            "Trade {} settled: {} gave {} + {:?}, {} gave {} + {:?}",
            trade.id,
            proposer,
            trade.offer_money,
            trade.offer_properties,
            acceptor,
            trade.request_money,
            trade.request_properties
        );
        Ok(AcceptOutcome::Settled(trade))
    }

    /// Discard an offer. Either party may reject.
    pub fn reject(&mut self, trade_id: &str, player: &str) -> Result<Trade, Rejection> {
        let trade = self.trades.get(trade_id).ok_or(Rejection::TradeNotFound)?;
        if !trade.involves(player) {
            return Err(Rejection::NotTradeParty);
        }
        self.trades.remove(trade_id).ok_or(Rejection::TradeNotFound)
    }

    /// Drop every offer involving `player`, returning them so both sides can be told.
    pub fn purge_player(&mut self, player: &str) -> Vec<Trade> {
        let ids: Vec<String> = self
            .trades
            .values()
            .filter(|t| t.involves(player))
            .map(|t| t.id.clone())
            .collect();
        ids.iter().filter_map(|id| self.trades.remove(id)).collect()
    }

    pub fn clear(&mut self) {
        self.trades.clear();
    }
}

/// Both parties solvent and present, every deed still held by the side giving it, and
/// both money legs affordable.
fn validate(session: &GameSession, trade: &Trade) -> Result<(), Rejection> {
    let from = session
        .player(&trade.from_player_id)
        .ok_or(Rejection::UnknownPlayer)?;
    let to = session
        .player(&trade.to_player_id)
        .ok_or(Rejection::UnknownPlayer)?;
    if from.bankrupt || to.bankrupt {
        return Err(Rejection::PlayerBankrupt);
    }
    if !trade.offer_properties.iter().all(|t| from.owns(*t))
        || !trade.request_properties.iter().all(|t| to.owns(*t))
    {
        return Err(Rejection::NotOwner);
    }
    if from.money < trade.offer_money || to.money < trade.request_money {
        return Err(Rejection::InsufficientFunds);
    }
    Ok(())
}

/// Deeds change hands with their buildings.
fn move_deeds(session: &mut GameSession, tiles: &[TileId], giver: &str, taker: &str) {
    for tile in tiles {
        let development = session
            .player(giver)
            .and_then(|p| p.owned_properties.get(tile))
            .copied()
            .unwrap_or_default();
        session.assign_property(*tile, Some(taker), development);
    }
}
