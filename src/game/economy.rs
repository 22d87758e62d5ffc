//! Money and ownership primitives: transfers, forced settlement, liquidation,
//! bankruptcy, purchases and building.
//!
//! The bank is [`Account::Bank`]: an infinite source and sink, never balance-checked.

use super::board::{Money, TileId, TileKind};
use super::errors::Rejection;
use super::player::{Account, Development, PlayerId, MAX_HOUSES};
use super::rent;
use super::state::{GameOver, GameSession, SessionNotice, TileEvent, TurnFlags};
use crate::logutil::escape_log;

impl GameSession {
    /// Current owner of a tile, if any.
    pub fn owner_of(&self, tile: TileId) -> Option<&PlayerId> {
        self.players
            .values()
            .find(|p| p.owns(tile))
            .map(|p| &p.id)
    }

    /// Cash plus the liquidation value of every held tile.
    pub fn total_asset_value(&self, id: &str) -> Money {
        let Some(player) = self.players.get(id) else {
            return 0;
        };
        player.money
            + player
                .owned_properties
                .keys()
                .filter_map(|t| self.board.tile(*t))
                .map(|t| t.liquidation_value())
                .sum::<Money>()
    }

    pub fn has_monopoly(&self, id: &str, country: &str) -> bool {
        self.players
            .get(id)
            .map(|p| rent::has_monopoly(&self.board, p, country))
            .unwrap_or(false)
    }

    /// Move money between accounts. Fails without side effects when a player payer
    /// cannot cover the amount; a checked debit never leaves the payer negative.
    pub fn transfer(&mut self, from: &Account, to: &Account, amount: Money) -> bool {
        if amount < 0 {
            return false;
        }
        if let Account::Player(pid) = from {
            match self.players.get_mut(pid) {
                Some(p) if p.money >= amount => p.money -= amount,
                _ => return false,
            }
        }
        if let Account::Player(pid) = to {
            if let Some(p) = self.players.get_mut(pid) {
                p.money += amount;
            }
        }
        true
    }

    /// Charge `amount` no matter what: try a plain transfer, otherwise liquidate the
    /// shortfall, otherwise force the debit into the negative and run the bankruptcy check.
    pub fn settle(&mut self, from: &str, to: &Account, amount: Money, events: &mut Vec<TileEvent>) {
        let payer = Account::player(from);
        if self.transfer(&payer, to, amount) {
            return;
        }
        let Some(cash) = self.players.get(from).map(|p| p.money) else {
            return;
        };
        self.liquidate(from, amount - cash, events);
        if self.transfer(&payer, to, amount) {
            return;
        }

        if let Some(p) = self.players.get_mut(from) {
            p.money -= amount;
        }
        if let Account::Player(pid) = to {
            if let Some(p) = self.players.get_mut(pid) {
                p.money += amount;
            }
        }
        self.check_bankruptcy(from, events);
    }

    /// Sell tiles back to the unowned pool, lowest id first, until `target` is raised
    /// or nothing is left. Buildings are lost with the tile. Returns the cash raised.
    pub fn liquidate(&mut self, id: &str, target: Money, events: &mut Vec<TileEvent>) -> Money {
        if target <= 0 {
            return 0;
        }
        let Some(player) = self.players.get_mut(id) else {
            return 0;
        };

        let mut raised = 0;
        let mut sold = Vec::new();
        let held: Vec<TileId> = player.owned_properties.keys().copied().collect();
        for tile in held {
            if raised >= target {
                break;
            }
            raised += self
                .board
                .tile(tile)
                .map(|t| t.liquidation_value())
                .unwrap_or(0);
            player.owned_properties.remove(&tile);
            sold.push(tile);
        }
        player.money += raised;

        if !sold.is_empty() {
            log::info!("Liquidated {:?} from {} for {}", sold, id, raised);
            events.push(TileEvent::Liquidated {
                player_id: id.to_string(),
                property_ids: sold,
                raised,
            });
        }
        raised
    }

    /// A player still negative after liquidating everything goes bankrupt. Returns true
    /// only on the transition, so a player is flagged exactly once.
    pub fn check_bankruptcy(&mut self, id: &str, events: &mut Vec<TileEvent>) -> bool {
        let deficit = match self.players.get(id) {
            Some(p) if !p.bankrupt && p.money < 0 => -p.money,
            _ => return false,
        };
        self.liquidate(id, deficit, events);
        if self.players.get(id).map(|p| p.money < 0).unwrap_or(false) {
            self.mark_bankrupt(id);
            events.push(TileEvent::Bankrupt {
                player_id: id.to_string(),
            });
            return true;
        }
        false
    }

    fn mark_bankrupt(&mut self, id: &str) {
        let Some(player) = self.players.get_mut(id) else {
            return;
        };
        player.bankrupt = true;
        player.owned_properties.clear();
        let player_name = player.name.clone();
        log::info!(
            "Player bankrupt: {} ({}) with balance {}",
            escape_log(&player_name),
            id,
            player.money
        );
        self.notices.push(SessionNotice::PlayerBankrupt {
            player_id: id.to_string(),
            player_name,
        });
        self.remove_from_turn_order(id);
        self.check_game_over();
    }

    /// Drop a player from the turn order while keeping the turn with the same live
    /// player. If the removed player held the turn it passes to whoever now occupies
    /// that slot, with fresh turn flags.
    pub(super) fn remove_from_turn_order(&mut self, id: &str) {
        let Some(index) = self.turn_order.iter().position(|p| p == id) else {
            return;
        };
        self.turn_order.remove(index);
        if self.turn_order.is_empty() {
            self.current_turn = 0;
            self.flags = TurnFlags::default();
            return;
        }
        if index < self.current_turn {
            self.current_turn -= 1;
        } else if index == self.current_turn {
            self.current_turn %= self.turn_order.len();
            self.flags = TurnFlags::default();
        }
    }

    /// Report a winner once exactly one solvent player remains in a started game.
    pub fn check_game_over(&mut self) -> Option<GameOver> {
        if !self.started || self.game_over_reported {
            return None;
        }
        let mut live = self
            .turn_order
            .iter()
            .filter_map(|id| self.players.get(id))
            .filter(|p| !p.bankrupt);
        let winner = live.next()?;
        if live.next().is_some() {
            return None;
        }
        let over = GameOver {
            winner_id: winner.id.clone(),
            winner_name: winner.name.clone(),
            winner_color: winner.color.clone(),
            winner_money: winner.money,
            winner_properties: winner.property_count(),
        };
        log::info!(
            "Game over, winner: {} ({})",
            escape_log(&over.winner_name),
            over.winner_id
        );
        self.game_over_reported = true;
        self.notices.push(SessionNotice::GameOver(over.clone()));
        Some(over)
    }

    /// Rent is capped at a share of the payer's total assets; whatever cash is missing
    /// for the capped amount is raised by liquidation before the charge.
    pub(super) fn charge_rent(
        &mut self,
        payer: &str,
        owner: &str,
        tile: TileId,
        due: Money,
        events: &mut Vec<TileEvent>,
    ) {
        let assets = self.total_asset_value(payer).max(0);
        let cap = assets * self.rules.rent_cap_percent / 100;
        let amount = due.min(cap);
        let cash = self.players.get(payer).map(|p| p.money).unwrap_or(0);
        if cash < amount {
            self.liquidate(payer, amount - cash, events);
        }
        self.settle(payer, &Account::player(owner), amount, events);
        log::info!(
            "Rent: {} paid {} to {} for tile {} (due {})",
            payer,
            amount,
            owner,
            tile,
            due
        );
        events.push(TileEvent::RentPaid {
            to: owner.to_string(),
            amount,
            property_id: tile,
        });
    }

    /// Hand a tile to `owner` (or back to the pool), clearing it from everyone else first.
    pub fn assign_property(&mut self, tile: TileId, owner: Option<&str>, development: Development) {
        for p in self.players.values_mut() {
            p.owned_properties.remove(&tile);
        }
        let Some(owner) = owner else {
            return;
        };
        if !self.board.tile(tile).map(|t| t.is_purchasable()).unwrap_or(false) {
            return;
        }
        if let Some(p) = self.players.get_mut(owner) {
            p.owned_properties.insert(tile, development);
        }
    }

    /// Buy an unowned tile at list price. One purchase per turn, and not in a turn that
    /// already started an auction.
    pub fn buy_property(&mut self, id: &str, tile_id: TileId) -> Result<Money, Rejection> {
        let player = self.require_turn(id)?;
        if self.flags.has_bought {
            return Err(Rejection::AlreadyBought);
        }
        if self.flags.has_started_auction {
            return Err(Rejection::AuctionAlreadyStarted);
        }
        let tile = self.board.tile(tile_id).ok_or(Rejection::InvalidProperty)?;
        let price = tile.price().ok_or(Rejection::NotPurchasable)?;
        if self.owner_of(tile_id).is_some() {
            return Err(Rejection::PropertyAlreadyOwned);
        }
        if player.money < price {
            return Err(Rejection::InsufficientFunds);
        }
        let name = tile.name.clone();

        self.transfer(&Account::player(id), &Account::Bank, price);
        self.assign_property(tile_id, Some(id), Development::Land);
        self.flags.has_bought = true;
        log::info!("{} bought {} ({}) for {}", id, name, tile_id, price);
        Ok(price)
    }

    /// Look up a plain property the player owns, for build and sell actions.
    fn owned_property(
        &self,
        id: &str,
        tile_id: TileId,
    ) -> Result<(Development, String, Money, Money), Rejection> {
        let tile = self.board.tile(tile_id).ok_or(Rejection::InvalidProperty)?;
        let TileKind::Property {
            country,
            house_price,
            hotel_price,
            ..
        } = &tile.kind
        else {
            return Err(Rejection::InvalidProperty);
        };
        let development = self
            .players
            .get(id)
            .and_then(|p| p.owned_properties.get(&tile_id))
            .copied()
            .ok_or(Rejection::NotOwner)?;
        Ok((development, country.clone(), *house_price, *hotel_price))
    }

    fn set_development(&mut self, id: &str, tile_id: TileId, development: Development) {
        if let Some(d) = self
            .players
            .get_mut(id)
            .and_then(|p| p.owned_properties.get_mut(&tile_id))
        {
            *d = development;
        }
    }

    pub fn build_house(&mut self, id: &str, tile_id: TileId) -> Result<Money, Rejection> {
        let money = self.require_turn(id)?.money;
        let (development, country, house_price, _) = self.owned_property(id, tile_id)?;
        if !self.has_monopoly(id, &country) {
            return Err(Rejection::NoMonopoly);
        }
        let next = match development {
            Development::Land => Development::Houses(1),
            Development::Houses(n) if n < MAX_HOUSES => Development::Houses(n + 1),
            Development::Houses(_) | Development::Hotel => {
                return Err(Rejection::MaxDevelopment)
            }
        };
        if money < house_price {
            return Err(Rejection::InsufficientFunds);
        }
        self.transfer(&Account::player(id), &Account::Bank, house_price);
        self.set_development(id, tile_id, next);
        log::info!("{} built a house on {} ({:?})", id, tile_id, next);
        Ok(house_price)
    }

    /// A hotel replaces four houses.
    pub fn build_hotel(&mut self, id: &str, tile_id: TileId) -> Result<Money, Rejection> {
        let money = self.require_turn(id)?.money;
        let (development, country, _, hotel_price) = self.owned_property(id, tile_id)?;
        if !self.has_monopoly(id, &country) {
            return Err(Rejection::NoMonopoly);
        }
        match development {
            Development::Hotel => return Err(Rejection::MaxDevelopment),
            Development::Houses(n) if n >= MAX_HOUSES => {}
            Development::Land | Development::Houses(_) => {
                return Err(Rejection::NeedsFourHouses)
            }
        }
        if money < hotel_price {
            return Err(Rejection::InsufficientFunds);
        }
        self.transfer(&Account::player(id), &Account::Bank, hotel_price);
        self.set_development(id, tile_id, Development::Hotel);
        log::info!("{} built a hotel on {}", id, tile_id);
        Ok(hotel_price)
    }

    fn refund(&self, price: Money) -> Money {
        price * self.rules.sell_refund_percent / 100
    }

    /// Sell one house back to the bank. Allowed outside the player's own turn.
    pub fn sell_house(&mut self, id: &str, tile_id: TileId) -> Result<Money, Rejection> {
        self.require_active(id)?;
        let (development, _, house_price, _) = self.owned_property(id, tile_id)?;
        let next = match development {
            Development::Houses(1) => Development::Land,
            Development::Houses(n) if n > 1 => Development::Houses(n - 1),
            _ => return Err(Rejection::CannotSell),
        };
        let refund = self.refund(house_price);
        self.transfer(&Account::Bank, &Account::player(id), refund);
        self.set_development(id, tile_id, next);
        log::info!("{} sold a house on {} for {}", id, tile_id, refund);
        Ok(refund)
    }

    /// Sell a hotel back to the bank; the tile reverts to four houses.
    pub fn sell_hotel(&mut self, id: &str, tile_id: TileId) -> Result<Money, Rejection> {
        self.require_active(id)?;
        let (development, _, _, hotel_price) = self.owned_property(id, tile_id)?;
        if development != Development::Hotel {
            return Err(Rejection::CannotSell);
        }
        let refund = self.refund(hotel_price);
        self.transfer(&Account::Bank, &Account::player(id), refund);
        self.set_development(id, tile_id, Development::Houses(MAX_HOUSES));
        log::info!("{} sold a hotel on {} for {}", id, tile_id, refund);
        Ok(refund)
    }

    /// Pay the fine to leave jail immediately. The player may not roll for the rest of
    /// the turn.
    pub fn pay_jail_fine(&mut self, id: &str) -> Result<Money, Rejection> {
        let player = self.require_turn(id)?;
        if !player.in_jail {
            return Err(Rejection::NotInJail);
        }
        if self.flags.paid_jail_fine {
            return Err(Rejection::FinePaidThisTurn);
        }
        let fine = self.rules.jail_fine;
        if player.money < fine {
            return Err(Rejection::CannotPayFine);
        }

        let mut events = Vec::new();
        self.settle(id, &Account::Bank, fine, &mut events);
        if let Some(p) = self.players.get_mut(id) {
            p.in_jail = false;
            p.jail_turns = 0;
        }
        self.flags.paid_jail_fine = true;
        self.check_bankruptcy(id, &mut events);
        log::info!("{} paid the jail fine of {}", id, fine);
        Ok(fine)
    }

    /// Voluntary bankruptcy: every tile goes back to the pool and cash drops to zero.
    pub fn declare_bankruptcy(&mut self, id: &str) -> Result<(), Rejection> {
        self.require_active(id)?;
        if let Some(p) = self.players.get_mut(id) {
            p.money = 0;
        }
        self.mark_bankrupt(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::board::Board;
    use crate::game::state::{DiceRoll, GameRules};

    fn started(n: usize) -> (GameSession, Vec<PlayerId>) {
        let mut s = GameSession::with_seed(Board::default(), GameRules::default(), 9);
        let ids: Vec<PlayerId> = (0..n)
            .map(|i| s.join(&format!("P{i}"), None, None).unwrap().player_id)
            .collect();
        for id in &ids {
            s.set_ready(id, true).unwrap();
        }
        s.start(&ids[0]).unwrap();
        (s, ids)
    }

    fn give(s: &mut GameSession, id: &str, tiles: &[(TileId, Development)]) {
        for (t, d) in tiles {
            s.assign_property(*t, Some(id), *d);
        }
    }

    #[test]
    fn transfer_checks_funds_and_conserves_money() {
        let (mut s, ids) = started(2);
        let before: Money = s.players().map(|p| p.money).sum();
        assert!(s.transfer(&Account::player(&ids[0]), &Account::player(&ids[1]), 300));
        assert!(!s.transfer(&Account::player(&ids[0]), &Account::player(&ids[1]), 5000));
        let after: Money = s.players().map(|p| p.money).sum();
        assert_eq!(before, after);
        assert_eq!(s.player(&ids[0]).unwrap().money, 1200);
    }

    #[test]
    fn settle_liquidates_in_ascending_order() {
        let (mut s, ids) = started(2);
        give(&mut s, &ids[0], &[(9, Development::Land), (1, Development::Land), (3, Development::Land)]);
        s.player_mut(&ids[0]).unwrap().money = 10;
        let mut events = Vec::new();
        s.settle(&ids[0], &Account::Bank, 50, &mut events);
        // tiles 1 and 3 raise 30 + 30
        let p = s.player(&ids[0]).unwrap();
        assert_eq!(p.money, 20);
        assert!(p.owns(9));
        assert!(!p.owns(1) && !p.owns(3));
        assert!(!p.bankrupt);
        assert!(s.owner_of(1).is_none());
        assert_eq!(
            events,
            vec![TileEvent::Liquidated {
                player_id: ids[0].clone(),
                property_ids: vec![1, 3],
                raised: 60
            }]
        );
    }

    #[test]
    fn settle_past_all_assets_bankrupts_once() {
        let (mut s, ids) = started(3);
        give(&mut s, &ids[1], &[(39, Development::Land)]);
        s.player_mut(&ids[1]).unwrap().money = 0;
        let mut events = Vec::new();
        s.settle(&ids[1], &Account::player(&ids[2]), 500, &mut events);
        let p = s.player(&ids[1]).unwrap();
        assert!(p.bankrupt);
        assert_eq!(p.money, -300);
        assert_eq!(s.player(&ids[2]).unwrap().money, 2000);
        assert!(!s.turn_order().contains(&ids[1]));
        assert!(events.contains(&TileEvent::Bankrupt { player_id: ids[1].clone() }));
        assert!(!s.check_bankruptcy(&ids[1], &mut events));
        let notices = s.take_notices();
        assert_eq!(notices.len(), 1);
    }

    #[test]
    fn rent_is_capped_at_share_of_assets() {
        let (mut s, ids) = started(2);
        give(&mut s, &ids[1], &[(37, Development::Hotel), (39, Development::Land)]);
        give(&mut s, &ids[0], &[(1, Development::Land), (3, Development::Land)]);
        s.player_mut(&ids[0]).unwrap().money = 100;
        // assets 100 + 30 + 30 = 160, cap 136; hotel rent 1500
        s.player_mut(&ids[0]).unwrap().position = 35;
        let out = s.apply_roll(&ids[0], DiceRoll::new(1, 1)).unwrap();
        assert!(out.events.contains(&TileEvent::RentPaid {
            to: ids[1].clone(),
            amount: 136,
            property_id: 37
        }));
        let payer = s.player(&ids[0]).unwrap();
        assert!(!payer.bankrupt);
        assert_eq!(payer.money, 100 + 60 - 136);
        assert_eq!(payer.property_count(), 0);
        assert_eq!(s.player(&ids[1]).unwrap().money, 1636);
    }

    #[test]
    fn buy_property_rules() {
        let (mut s, ids) = started(2);
        assert_eq!(s.buy_property(&ids[1], 1).unwrap_err(), Rejection::NotYourTurn);
        assert_eq!(s.buy_property(&ids[0], 2).unwrap_err(), Rejection::NotPurchasable);
        assert_eq!(s.buy_property(&ids[0], 99).unwrap_err(), Rejection::InvalidProperty);
        give(&mut s, &ids[1], &[(3, Development::Land)]);
        assert_eq!(s.buy_property(&ids[0], 3).unwrap_err(), Rejection::PropertyAlreadyOwned);
        assert_eq!(s.buy_property(&ids[0], 1).unwrap(), 60);
        assert_eq!(s.buy_property(&ids[0], 6).unwrap_err(), Rejection::AlreadyBought);
        assert_eq!(s.player(&ids[0]).unwrap().money, 1440);
        assert_eq!(s.owner_of(1), Some(&ids[0]));
    }

    #[test]
    fn buy_requires_funds() {
        let (mut s, ids) = started(2);
        s.player_mut(&ids[0]).unwrap().money = 50;
        assert_eq!(s.buy_property(&ids[0], 1).unwrap_err(), Rejection::InsufficientFunds);
        assert!(s.owner_of(1).is_none());
    }

    #[test]
    fn building_requires_monopoly_and_caps_at_hotel() {
        let (mut s, ids) = started(2);
        let p = &ids[0];
        give(&mut s, p, &[(1, Development::Land)]);
        assert_eq!(s.build_house(p, 1).unwrap_err(), Rejection::NoMonopoly);
        assert_eq!(s.build_house(p, 3).unwrap_err(), Rejection::NotOwner);
        give(&mut s, p, &[(3, Development::Land)]);
        assert_eq!(s.build_hotel(p, 1).unwrap_err(), Rejection::NeedsFourHouses);
        for n in 1..=4 {
            s.build_house(p, 1).unwrap();
            assert_eq!(s.player(p).unwrap().owned_properties[&1], Development::Houses(n));
        }
        assert_eq!(s.build_house(p, 1).unwrap_err(), Rejection::MaxDevelopment);
        s.build_hotel(p, 1).unwrap();
        assert_eq!(s.player(p).unwrap().owned_properties[&1], Development::Hotel);
        assert_eq!(s.build_hotel(p, 1).unwrap_err(), Rejection::MaxDevelopment);
        assert_eq!(s.player(p).unwrap().money, 1500 - 5 * 50);

        assert_eq!(s.sell_hotel(p, 1).unwrap(), 25);
        assert_eq!(s.player(p).unwrap().owned_properties[&1], Development::Houses(4));
        assert_eq!(s.sell_house(p, 1).unwrap(), 25);
        assert_eq!(s.sell_house(p, 3).unwrap_err(), Rejection::CannotSell);
        assert_eq!(s.build_house(p, 5).unwrap_err(), Rejection::InvalidProperty);
    }

    #[test]
    fn jail_fine_blocks_rolling_this_turn() {
        let (mut s, ids) = started(2);
        assert_eq!(s.pay_jail_fine(&ids[0]).unwrap_err(), Rejection::NotInJail);
        s.send_to_jail(&ids[0]);
        assert_eq!(s.pay_jail_fine(&ids[0]).unwrap(), 100);
        assert!(!s.player(&ids[0]).unwrap().in_jail);
        assert_eq!(
            s.apply_roll(&ids[0], DiceRoll::new(1, 2)).unwrap_err(),
            Rejection::FinePaidThisTurn
        );
        s.end_turn(&ids[0]).unwrap();
        assert!(s.is_current(&ids[1]));
    }

    #[test]
    fn turn_passes_when_current_player_goes_bankrupt() {
        let (mut s, ids) = started(3);
        s.apply_roll(&ids[0], DiceRoll::new(1, 2)).unwrap();
        s.end_turn(&ids[0]).unwrap();
        assert!(s.is_current(&ids[1]));
        s.declare_bankruptcy(&ids[1]).unwrap();
        assert!(s.is_current(&ids[2]));
        assert_eq!(s.flags(), TurnFlags::default());

        s.declare_bankruptcy(&ids[0]).unwrap();
        assert!(s.is_current(&ids[2]));
        let notices = s.take_notices();
        assert!(matches!(
            notices.last(),
            Some(SessionNotice::GameOver(GameOver { winner_id, .. })) if winner_id == &ids[2]
        ));
        assert_eq!(
            s.declare_bankruptcy(&ids[0]).unwrap_err(),
            Rejection::PlayerBankrupt
        );
    }
}
