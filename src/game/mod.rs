//! Game core: board catalog, rent, chance deck, the session state machine and the
//! auction and trade subsystems layered on its money and ownership primitives.
//!
//! Everything in this module is synchronous and transport-agnostic. The server drives it
//! from a single task, which is what makes each action atomic with respect to the others.

pub mod auction;
pub mod board;
pub mod chance;
mod economy;
pub mod errors;
pub mod player;
pub mod rent;
pub mod snapshot;
pub mod state;
pub mod trade;

pub use auction::{Auction, AuctionHouse, AuctionResult, AuctionRules, BidOutcome};
pub use board::{Board, Money, Tile, TileId, TileKind};
pub use chance::{ChanceCard, ChanceDeck, ChanceEffect};
pub use errors::{BoardError, Rejection};
pub use player::{Account, Development, Player, PlayerId};
pub use snapshot::{SessionSnapshot, StateView};
pub use state::{
    DiceRoll, EndTurnOutcome, GameOver, GameRules, GameSession, JoinOutcome, RollOutcome,
    SessionNotice, TileEvent, TurnFlags,
};
pub use trade::{AcceptOutcome, Trade, TradeDesk, TradeStatus, TradeTerms};
