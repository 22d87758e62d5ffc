use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reason an inbound action was refused. Rejections are delivered only to the player
/// who initiated the action and never leave partial state behind.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    #[error("not your turn")]
    NotYourTurn,
    #[error("already rolled this turn")]
    AlreadyRolled,
    #[error("must roll before ending the turn")]
    MustRollFirst,
    #[error("rolling too fast")]
    TooFast,
    #[error("player is in jail")]
    InJail,
    #[error("jail fine already paid this turn")]
    FinePaidThisTurn,
    #[error("player is bankrupt")]
    PlayerBankrupt,
    #[error("already bought a property this turn")]
    AlreadyBought,
    #[error("an auction was already started this turn")]
    AuctionAlreadyStarted,
    #[error("an auction is already running")]
    AuctionInProgress,
    #[error("no auction is running")]
    NoActiveAuction,
    #[error("the auction has closed")]
    AuctionClosed,
    #[error("bid step is not allowed")]
    InvalidBidStep,
    #[error("bid exceeds available cash")]
    BidTooHigh,
    #[error("bid would not change the standings")]
    BidUnchanged,
    #[error("tile does not exist")]
    InvalidProperty,
    #[error("tile cannot be bought")]
    NotPurchasable,
    #[error("tile cannot be auctioned")]
    NotAuctionable,
    #[error("property already owned")]
    PropertyAlreadyOwned,
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("player does not own this property")]
    NotOwner,
    #[error("player does not hold the full group")]
    NoMonopoly,
    #[error("property is fully developed")]
    MaxDevelopment,
    #[error("a hotel needs four houses first")]
    NeedsFourHouses,
    #[error("nothing to sell")]
    CannotSell,
    #[error("player is not in jail")]
    NotInJail,
    #[error("cannot pay the jail fine")]
    CannotPayFine,
    #[error("game has not started")]
    GameNotStarted,
    #[error("game already started")]
    GameAlreadyStarted,
    #[error("game is full")]
    GameFull,
    #[error("only the host can do that")]
    NotHost,
    #[error("not enough ready players to start")]
    CannotStart,
    #[error("color already taken")]
    ColorTaken,
    #[error("invalid color")]
    InvalidColor,
    #[error("invalid name")]
    InvalidName,
    #[error("unknown player")]
    UnknownPlayer,
    #[error("join the lobby first")]
    NotJoined,
    #[error("trade not found")]
    TradeNotFound,
    #[error("player is not a party to this trade")]
    NotTradeParty,
    #[error("invalid trade terms")]
    InvalidTrade,
    #[error("trade could not be settled")]
    TradeFailed,
    #[error("malformed action")]
    MalformedAction,
}

impl Rejection {
    /// Stable wire code, identical to the serde representation.
    pub fn code(&self) -> String {
        serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "rejected".to_string())
    }
}

/// Errors raised while loading or validating a board catalog.
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("board has no tiles")]
    Empty,

    #[error("tile ids must match positions: expected {expected}, found {found}")]
    NonSequentialId { expected: usize, found: usize },

    #[error("first tile must be the start tile")]
    MissingStart,

    #[error("failed to read board file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse board file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_snake_case() {
        assert_eq!(Rejection::NotYourTurn.code(), "not_your_turn");
        assert_eq!(Rejection::InsufficientFunds.code(), "insufficient_funds");
        assert_eq!(Rejection::InvalidBidStep.code(), "invalid_bid_step");
    }
}
