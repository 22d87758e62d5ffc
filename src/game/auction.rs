//! Single-slot timed property auction.
//!
//! The house is either idle or holds one active [`Auction`]. Nothing here sleeps: callers
//! pass the current time in, and the server schedules a deadline command that funnels into
//! [`AuctionHouse::resolve_due`]. Resolution takes the auction out of the slot, so a
//! second call (late timer, late bid) finds nothing to do.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use super::board::{Money, TileId};
use super::errors::Rejection;
use super::player::{Account, Development, PlayerId};
use super::state::GameSession;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuctionRules {
    pub duration: Duration,
    /// Extra time the deadline timer waits past `ends_at`.
    pub grace: Duration,
    pub bid_steps: Vec<Money>,
}

impl Default for AuctionRules {
    fn default() -> Self {
        Self {
            duration: Duration::from_millis(30_000),
            grace: Duration::from_millis(50),
            bid_steps: vec![10, 50, 100],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Auction {
    pub id: String,
    pub property_id: TileId,
    pub started_by: PlayerId,
    pub highest_bid: Money,
    pub highest_bidder: Option<PlayerId>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub ends_at: DateTime<Utc>,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionResult {
    #[serde(flatten)]
    pub auction: Auction,
    pub winner: Option<PlayerId>,
    pub price: Money,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BidOutcome {
    Accepted(Auction),
    /// The deadline had already passed; the bid was refused and the auction resolved.
    Closed(AuctionResult),
}

#[derive(Debug, Default)]
pub struct AuctionHouse {
    rules: AuctionRules,
    current: Option<Auction>,
}

impl AuctionHouse {
    pub fn new(mut rules: AuctionRules) -> Self {
        rules.bid_steps.retain(|s| *s > 0);
        Self {
            rules,
            current: None,
        }
    }

    pub fn rules(&self) -> &AuctionRules {
        &self.rules
    }

    pub fn current(&self) -> Option<&Auction> {
        self.current.as_ref().filter(|a| a.active)
    }

    pub fn is_active_for(&self, tile: TileId) -> bool {
        self.current().map(|a| a.property_id == tile).unwrap_or(false)
    }

    /// How long after `now` the deadline timer should fire for the current auction.
    pub fn timer_delay(&self, now: DateTime<Utc>) -> Option<Duration> {
        let auction = self.current()?;
        let remaining = (auction.ends_at - now).to_std().unwrap_or(Duration::ZERO);
        Some(remaining + self.rules.grace)
    }

    /// Open an auction on an unowned plain property. Uses up the current player's
    /// auction for the turn.
    pub fn start(
        &mut self,
        session: &mut GameSession,
        id: &str,
        tile: TileId,
        now: DateTime<Utc>,
    ) -> Result<Auction, Rejection> {
        session.require_turn(id)?;
        let flags = session.flags();
        if flags.has_bought {
            return Err(Rejection::AlreadyBought);
        }
        if flags.has_started_auction {
            return Err(Rejection::AuctionAlreadyStarted);
        }
        if self.current().is_some() {
            return Err(Rejection::AuctionInProgress);
        }
        let catalog_tile = session.board().tile(tile).ok_or(Rejection::InvalidProperty)?;
        if session.owner_of(tile).is_some() {
            return Err(Rejection::PropertyAlreadyOwned);
        }
        if !catalog_tile.is_auctionable() {
            return Err(Rejection::NotAuctionable);
        }

        let duration = chrono::Duration::from_std(self.rules.duration)
            .unwrap_or_else(|_| chrono::Duration::seconds(30));
        let auction = Auction {
            id: Uuid::new_v4().to_string(),
            property_id: tile,
            started_by: id.to_string(),
            highest_bid: 0,
            highest_bidder: None,
            ends_at: now + duration,
            active: true,
        };
        session.mark_auction_started();
        self.current = Some(auction.clone());
        log::info!("Auction {} opened on tile {} by {}", auction.id, tile, id);
        Ok(auction)
    }

    /// Raise the current bid by one of the allowed steps.
    pub fn bid(
        &mut self,
        session: &mut GameSession,
        id: &str,
        step: Money,
        now: DateTime<Utc>,
    ) -> Result<BidOutcome, Rejection> {
        let ends_at = self.current().ok_or(Rejection::NoActiveAuction)?.ends_at;
        if now > ends_at {
            return match self.resolve(session) {
                Some(result) => Ok(BidOutcome::Closed(result)),
                None => Err(Rejection::AuctionClosed),
            };
        }
        if !self.rules.bid_steps.contains(&step) {
            return Err(Rejection::InvalidBidStep);
        }

        let player = session.require_active(id)?;
        let money = player.money;
        let Some(auction) = self.current.as_mut().filter(|a| a.active) else {
            return Err(Rejection::NoActiveAuction);
        };
        if auction.highest_bidder.as_deref() == Some(id) {
            return Err(Rejection::BidUnchanged);
        }
        let next = auction.highest_bid + step;
        if next > money {
            return Err(Rejection::BidTooHigh);
        }
        auction.highest_bid = next;
        auction.highest_bidder = Some(id.to_string());
        log::debug!("Auction {}: {} bids {}", auction.id, id, next);
        Ok(BidOutcome::Accepted(auction.clone()))
    }

    /// Resolve the auction named by a deadline timer. Stale ids, early timers and
    /// already-resolved auctions are no-ops.
    pub fn resolve_due(
        &mut self,
        session: &mut GameSession,
        auction_id: &str,
        now: DateTime<Utc>,
    ) -> Option<AuctionResult> {
        let auction = self.current()?;
        if auction.id != auction_id || now < auction.ends_at {
            return None;
        }
        self.resolve(session)
    }

    /// Close the active auction. A solvent highest bidder pays exactly the highest bid to
    /// the bank and receives the tile; otherwise the tile stays unowned.
    pub fn resolve(&mut self, session: &mut GameSession) -> Option<AuctionResult> {
        let mut auction = self.current.take().filter(|a| a.active)?;
        auction.active = false;

        let price = auction.highest_bid;
        let winner = auction.highest_bidder.clone().filter(|bidder| {
            let solvent = session
                .player(bidder)
                .map(|p| !p.bankrupt && p.money >= price)
                .unwrap_or(false);
            solvent && session.owner_of(auction.property_id).is_none()
        });

        match &winner {
            Some(bidder) => {
                session.transfer(&Account::player(bidder), &Account::Bank, price);
                session.assign_property(auction.property_id, Some(bidder.as_str()), Development::Land);
                log::info!(
                    "Auction {} won by {} for {} (tile {})",
                    auction.id,
                    bidder,
                    price,
                    auction.property_id
                );
            }
            None => log::info!(
                "Auction {} closed without a sale (tile {})",
                auction.id,
                auction.property_id
            ),
        }

        Some(AuctionResult {
            price: if winner.is_some() { price } else { 0 },
            winner,
            auction,
        })
    }

    /// Drop any running auction without settling it.
    pub fn clear(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::board::Board;
    use crate::game::state::GameRules;

    fn setup() -> (GameSession, AuctionHouse, Vec<PlayerId>, DateTime<Utc>) {
        let mut s = GameSession::with_seed(Board::default(), GameRules::default(), 3);
        let ids: Vec<PlayerId> = ["Ada", "Bob", "Cy"]
            .iter()
            .map(|n| s.join(n, None, None).unwrap().player_id)
            .collect();
        for id in &ids {
            s.set_ready(id, true).unwrap();
        }
        s.start(&ids[0]).unwrap();
        (s, AuctionHouse::new(AuctionRules::default()), ids, Utc::now())
    }

    #[test]
    fn start_rules() {
        let (mut s, mut house, ids, now) = setup();
        assert_eq!(
            house.start(&mut s, &ids[1], 6, now).unwrap_err(),
            Rejection::NotYourTurn
        );
        assert_eq!(
            house.start(&mut s, &ids[0], 5, now).unwrap_err(),
            Rejection::NotAuctionable
        );
        s.assign_property(8, Some(ids[1].as_str()), Development::Land);
        assert_eq!(
            house.start(&mut s, &ids[0], 8, now).unwrap_err(),
            Rejection::PropertyAlreadyOwned
        );
        let auction = house.start(&mut s, &ids[0], 6, now).unwrap();
        assert_eq!(auction.highest_bid, 0);
        assert!(s.flags().has_started_auction);
        assert_eq!(
            house.start(&mut s, &ids[0], 9, now).unwrap_err(),
            Rejection::AuctionAlreadyStarted
        );
        assert_eq!(
            s.buy_property(&ids[0], 6).unwrap_err(),
            Rejection::AuctionAlreadyStarted
        );
    }

    #[test]
    fn bids_advance_and_winner_pays_highest_bid() {
        let (mut s, mut house, ids, now) = setup();
        let auction = house.start(&mut s, &ids[0], 6, now).unwrap();
        assert_eq!(
            house.bid(&mut s, &ids[1], 25, now).unwrap_err(),
            Rejection::InvalidBidStep
        );
        assert!(matches!(
            house.bid(&mut s, &ids[1], 50, now).unwrap(),
            BidOutcome::Accepted(Auction { highest_bid: 50, .. })
        ));
        assert_eq!(
            house.bid(&mut s, &ids[1], 50, now).unwrap_err(),
            Rejection::BidUnchanged
        );
        assert!(matches!(
            house.bid(&mut s, &ids[2], 50, now).unwrap(),
            BidOutcome::Accepted(Auction { highest_bid: 100, .. })
        ));

        assert!(house.resolve_due(&mut s, &auction.id, now).is_none());
        assert!(house.resolve_due(&mut s, "other", auction.ends_at).is_none());
        let result = house.resolve_due(&mut s, &auction.id, auction.ends_at).unwrap();
        assert_eq!(result.winner.as_deref(), Some(ids[2].as_str()));
        assert_eq!(result.price, 100);
        assert!(!result.auction.active);
        assert_eq!(s.owner_of(6), Some(&ids[2]));
        assert_eq!(s.player(&ids[2]).unwrap().money, 1400);
        assert!(house.resolve(&mut s).is_none());
    }

    #[test]
    fn bid_above_cash_is_refused() {
        let (mut s, mut house, ids, now) = setup();
        house.start(&mut s, &ids[0], 6, now).unwrap();
        s.player_mut(&ids[1]).unwrap().money = 40;
        assert_eq!(
            house.bid(&mut s, &ids[1], 50, now).unwrap_err(),
            Rejection::BidTooHigh
        );
        assert_eq!(house.current().unwrap().highest_bid, 0);
    }

    #[test]
    fn late_bid_resolves_instead() {
        let (mut s, mut house, ids, now) = setup();
        let auction = house.start(&mut s, &ids[0], 6, now).unwrap();
        house.bid(&mut s, &ids[1], 10, now).unwrap();
        let late = auction.ends_at + chrono::Duration::milliseconds(1);
        match house.bid(&mut s, &ids[2], 100, late).unwrap() {
            BidOutcome::Closed(result) => {
                assert_eq!(result.winner.as_deref(), Some(ids[1].as_str()));
                assert_eq!(result.price, 10);
            }
            other => panic!("expected closed auction, got {other:?}"),
        }
        assert_eq!(
            house.bid(&mut s, &ids[2], 100, late).unwrap_err(),
            Rejection::NoActiveAuction
        );
    }

    #[test]
    fn late_bid_with_bad_step_still_closes() {
        let (mut s, mut house, ids, now) = setup();
        let auction = house.start(&mut s, &ids[0], 6, now).unwrap();
        house.bid(&mut s, &ids[1], 50, now).unwrap();
        let late = auction.ends_at + chrono::Duration::seconds(1);
        match house.bid(&mut s, &ids[2], 25, late).unwrap() {
            BidOutcome::Closed(result) => {
                assert_eq!(result.winner.as_deref(), Some(ids[1].as_str()));
                assert_eq!(result.price, 50);
            }
            other => panic!("expected closed auction, got {other:?}"),
        }
        assert!(house.current().is_none());
        assert_eq!(s.owner_of(6), Some(&ids[1]));
        assert_eq!(
            house.bid(&mut s, &ids[2], 25, late).unwrap_err(),
            Rejection::NoActiveAuction
        );
    }

    #[test]
    fn no_bids_or_broke_winner_leaves_tile_unowned() {
        let (mut s, mut house, ids, now) = setup();
        house.start(&mut s, &ids[0], 6, now).unwrap();
        let result = house.resolve(&mut s).unwrap();
        assert!(result.winner.is_none());
        assert!(s.owner_of(6).is_none());

        s.apply_roll(&ids[0], crate::game::state::DiceRoll::new(1, 2)).unwrap();
        s.end_turn(&ids[0]).unwrap();
        house.start(&mut s, &ids[1], 9, now).unwrap();
        house.bid(&mut s, &ids[2], 100, now).unwrap();
        s.player_mut(&ids[2]).unwrap().money = 20;
        let result = house.resolve(&mut s).unwrap();
        assert!(result.winner.is_none());
        assert_eq!(result.price, 0);
        assert!(s.owner_of(9).is_none());
        assert_eq!(s.player(&ids[2]).unwrap().money, 20);
    }

    #[test]
    fn timer_delay_includes_grace() {
        let (mut s, mut house, ids, now) = setup();
        assert!(house.timer_delay(now).is_none());
        house.start(&mut s, &ids[0], 6, now).unwrap();
        assert_eq!(house.timer_delay(now), Some(Duration::from_millis(30_050)));
    }
}
