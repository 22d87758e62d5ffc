//! Wire format between clients and the game server.
//!
//! Every frame is a JSON object tagged by `type` (snake_case) with camelCase fields.
//! Inbound frames decode into [`ClientAction`]; anything that does not decode is answered
//! with `action_rejected { reason: "malformed_action" }` and never reaches the game.

use serde::{Deserialize, Serialize};

use crate::game::{
    Auction, AuctionResult, DiceRoll, GameOver, Money, PlayerId, Rejection, StateView, Tile,
    TileEvent, TileId, Trade, TradeStatus, TradeTerms,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientAction {
    #[serde(rename_all = "camelCase")]
    JoinLobby {
        name: String,
        #[serde(default)]
        color: Option<String>,
        #[serde(default)]
        existing_id: Option<PlayerId>,
    },
    LeaveLobby,
    SetPlayerColor {
        color: String,
    },
    SetReady {
        #[serde(default = "default_true")]
        ready: bool,
    },
    StartGame,
    RollDice,
    #[serde(rename_all = "camelCase")]
    BuyProperty {
        property_id: TileId,
    },
    #[serde(rename_all = "camelCase")]
    StartAuction {
        property_id: TileId,
    },
    AuctionBid {
        step: Money,
    },
    EndTurn,
    PayJailFine,
    #[serde(rename_all = "camelCase")]
    BuildHouse {
        property_id: TileId,
    },
    #[serde(rename_all = "camelCase")]
    BuildHotel {
        property_id: TileId,
    },
    #[serde(rename_all = "camelCase")]
    SellHouse {
        property_id: TileId,
    },
    #[serde(rename_all = "camelCase")]
    SellHotel {
        property_id: TileId,
    },
    ProposeTrade(TradeTerms),
    #[serde(rename_all = "camelCase")]
    AcceptTrade {
        trade_id: String,
    },
    #[serde(rename_all = "camelCase")]
    RejectTrade {
        trade_id: String,
    },
    DeclareBankruptcy,
    ResetGame,
}

fn default_true() -> bool {
    true
}

impl ClientAction {
    /// Decode one inbound text frame.
    pub fn parse(text: &str) -> Result<Self, Rejection> {
        serde_json::from_str(text).map_err(|_| Rejection::MalformedAction)
    }

    /// Wire name of the action, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientAction::JoinLobby { .. } => "join_lobby",
            ClientAction::LeaveLobby => "leave_lobby",
            ClientAction::SetPlayerColor { .. } => "set_player_color",
            ClientAction::SetReady { .. } => "set_ready",
            ClientAction::StartGame => "start_game",
            ClientAction::RollDice => "roll_dice",
            ClientAction::BuyProperty { .. } => "buy_property",
            ClientAction::StartAuction { .. } => "start_auction",
            ClientAction::AuctionBid { .. } => "auction_bid",
            ClientAction::EndTurn => "end_turn",
            ClientAction::PayJailFine => "pay_jail_fine",
            ClientAction::BuildHouse { .. } => "build_house",
            ClientAction::BuildHotel { .. } => "build_hotel",
            ClientAction::SellHouse { .. } => "sell_house",
            ClientAction::SellHotel { .. } => "sell_hotel",
            ClientAction::ProposeTrade(_) => "propose_trade",
            ClientAction::AcceptTrade { .. } => "accept_trade",
            ClientAction::RejectTrade { .. } => "reject_trade",
            ClientAction::DeclareBankruptcy => "declare_bankruptcy",
            ClientAction::ResetGame => "reset_game",
        }
    }
}

/// Outbound events. Only `state_update` borrows from the session; everything else is
/// owned so it can be built before the session is touched again.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent<'a> {
    StateUpdate(StateView<'a>),
    #[serde(rename_all = "camelCase")]
    Joined {
        player_id: PlayerId,
        reconnected: bool,
    },
    JoinError {
        reason: Rejection,
        message: String,
    },
    ColorRejected {
        reason: Rejection,
        message: String,
    },
    ActionRejected {
        action: &'static str,
        reason: Rejection,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    DiceRolled {
        player_id: PlayerId,
        dice: DiceRoll,
        tile: Tile,
        events: Vec<TileEvent>,
    },
    AuctionStarted(Auction),
    AuctionUpdated(Auction),
    AuctionFinished(AuctionResult),
    TradeOffer(Trade),
    #[serde(rename_all = "camelCase")]
    TradeUpdated {
        trade_id: String,
        status: TradeStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<Rejection>,
    },
    #[serde(rename_all = "camelCase")]
    PlayerBankrupt {
        player_id: PlayerId,
        player_name: String,
    },
    GameOver(GameOver),
    #[serde(rename_all = "camelCase")]
    JailTurnSkipped {
        player_id: PlayerId,
        player_name: String,
        turns_remaining: u8,
    },
    #[serde(rename_all = "camelCase")]
    JailPaid {
        player_id: PlayerId,
        amount: Money,
    },
}

impl ServerEvent<'_> {
    pub fn rejected(action: &'static str, reason: Rejection) -> Self {
        ServerEvent::ActionRejected {
            action,
            reason,
            message: reason.to_string(),
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_tagged_actions() {
        let action = ClientAction::parse(r#"{"type":"buy_property","propertyId":6}"#).unwrap();
        assert_eq!(action, ClientAction::BuyProperty { property_id: 6 });

        let action =
            ClientAction::parse(r#"{"type":"join_lobby","name":"Ada","existingId":"p-1"}"#).unwrap();
        assert_eq!(
            action,
            ClientAction::JoinLobby {
                name: "Ada".into(),
                color: None,
                existing_id: Some("p-1".into())
            }
        );

        let action = ClientAction::parse(r#"{"type":"set_ready"}"#).unwrap();
        assert_eq!(action, ClientAction::SetReady { ready: true });
    }

    #[test]
    fn propose_trade_fields_sit_beside_the_tag() {
        let action = ClientAction::parse(
            r#"{"type":"propose_trade","toPlayerId":"b","offerMoney":300,"offerProperties":[5],"requestProperties":[9]}"#,
        )
        .unwrap();
        let ClientAction::ProposeTrade(terms) = action else {
            panic!("wrong variant");
        };
        assert_eq!(terms.to_player_id, "b");
        assert_eq!(terms.offer_money, 300);
        assert_eq!(terms.request_money, 0);
        assert_eq!(terms.request_properties, vec![9]);
    }

    #[test]
    fn malformed_frames_are_rejected() {
        for frame in [
            "not json",
            r#"{"type":"fly_away"}"#,
            r#"{"type":"buy_property"}"#,
            r#"{"type":"auction_bid","step":"ten"}"#,
            r#"{"propertyId":1}"#,
        ] {
            assert_eq!(ClientAction::parse(frame), Err(Rejection::MalformedAction), "{frame}");
        }
    }

    #[test]
    fn events_are_tagged_with_camel_case_fields() {
        let text = ServerEvent::JailTurnSkipped {
            player_id: "p".into(),
            player_name: "Ada".into(),
            turns_remaining: 1,
        }
        .encode()
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value,
            json!({"type": "jail_turn_skipped", "playerId": "p", "playerName": "Ada", "turnsRemaining": 1})
        );

        let text = ServerEvent::rejected("roll_dice", Rejection::NotYourTurn)
            .encode()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "action_rejected");
        assert_eq!(value["reason"], "not_your_turn");
        assert_eq!(value["action"], "roll_dice");

        let text = ServerEvent::TradeUpdated {
            trade_id: "t".into(),
            status: TradeStatus::Accepted,
            reason: None,
        }
        .encode()
        .unwrap();
        assert_eq!(text, r#"{"type":"trade_updated","tradeId":"t","status":"accepted"}"#);
    }
}
