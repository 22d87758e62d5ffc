use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::board::{Money, TileId};

pub type PlayerId = String;

/// Maximum number of houses on a single property before a hotel is required.
pub const MAX_HOUSES: u8 = 4;

/// Build state of an owned tile. Houses and a hotel are mutually exclusive, which the
/// enum makes unrepresentable; on the wire it keeps the `{houses, hotel}` shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "DevelopmentWire", into = "DevelopmentWire")]
pub enum Development {
    #[default]
    Land,
    Houses(u8),
    Hotel,
}

impl Development {
    pub fn houses(&self) -> u8 {
        match self {
            Development::Houses(n) => *n,
            _ => 0,
        }
    }

    pub fn has_hotel(&self) -> bool {
        matches!(self, Development::Hotel)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct DevelopmentWire {
    #[serde(default)]
    houses: u8,
    #[serde(default)]
    hotel: bool,
}

impl From<DevelopmentWire> for Development {
    fn from(w: DevelopmentWire) -> Self {
        if w.hotel {
            Development::Hotel
        } else if w.houses == 0 {
            Development::Land
        } else {
            Development::Houses(w.houses.min(MAX_HOUSES))
        }
    }
}

impl From<Development> for DevelopmentWire {
    fn from(d: Development) -> Self {
        DevelopmentWire {
            houses: d.houses(),
            hotel: d.has_hotel(),
        }
    }
}

/// Counterparty of a money movement. The bank is an infinite source and sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Account {
    Bank,
    Player(PlayerId),
}

impl Account {
    pub fn player(id: &str) -> Self {
        Account::Player(id.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    pub money: Money,
    #[serde(default)]
    pub position: TileId,
    #[serde(default)]
    pub in_jail: bool,
    #[serde(default)]
    pub jail_turns: u8,
    #[serde(default)]
    pub bankrupt: bool,
    #[serde(default)]
    pub owned_properties: BTreeMap<TileId, Development>,
}

impl Player {
    pub fn new(id: &str, name: &str, color: Option<String>, money: Money) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            color,
            money,
            position: 0,
            in_jail: false,
            jail_turns: 0,
            bankrupt: false,
            owned_properties: BTreeMap::new(),
        }
    }

    pub fn owns(&self, tile: TileId) -> bool {
        self.owned_properties.contains_key(&tile)
    }

    pub fn property_count(&self) -> usize {
        self.owned_properties.len()
    }
}
