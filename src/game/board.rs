//! Board catalog: the immutable tile table a session plays on.
//!
//! The catalog is static for the lifetime of a game. A built-in 40 tile board is used
//! unless `game.board_file` points at a JSON array of tiles, which is validated on load.

use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::Path;

use super::errors::BoardError;

pub type TileId = usize;
pub type Money = i64;

/// Fallback jail position when a catalog has no explicit jail tile.
pub const DEFAULT_JAIL_TILE: TileId = 10;
/// Fallback salary when the start tile does not carry one.
pub const DEFAULT_SALARY: Money = 200;

/// Closed set of tile kinds. Every match over this enum is exhaustive so a new kind
/// has to be handled everywhere the engine inspects tiles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TileKind {
    Start {
        #[serde(default)]
        salary: Money,
    },
    #[serde(rename_all = "camelCase")]
    Property {
        country: String,
        price: Money,
        house_price: Money,
        hotel_price: Money,
        #[serde(default)]
        mortgage_value: Money,
        /// Rent for bare land, 1..4 houses and a hotel.
        rent: [Money; 6],
    },
    #[serde(rename_all = "camelCase")]
    Airport {
        price: Money,
        #[serde(default)]
        mortgage_value: Money,
    },
    #[serde(rename_all = "camelCase")]
    Utility {
        price: Money,
        #[serde(default)]
        mortgage_value: Money,
    },
    Tax {
        amount: Money,
    },
    Chance,
    CommunityChest,
    Jail,
    GoToJail,
    FreeParking,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tile {
    pub id: TileId,
    pub name: String,
    #[serde(flatten)]
    pub kind: TileKind,
}

impl Tile {
    /// Property, airport and utility tiles can be owned.
    pub fn is_purchasable(&self) -> bool {
        matches!(
            self.kind,
            TileKind::Property { .. } | TileKind::Airport { .. } | TileKind::Utility { .. }
        )
    }

    /// Only plain properties go to auction.
    pub fn is_auctionable(&self) -> bool {
        matches!(self.kind, TileKind::Property { .. })
    }

    pub fn price(&self) -> Option<Money> {
        match self.kind {
            TileKind::Property { price, .. }
            | TileKind::Airport { price, .. }
            | TileKind::Utility { price, .. } => Some(price),
            _ => None,
        }
    }

    /// Cash raised when the tile is liquidated: the mortgage value, or half the price
    /// when the catalog leaves it at zero.
    pub fn liquidation_value(&self) -> Money {
        match self.kind {
            TileKind::Property {
                price,
                mortgage_value,
                ..
            }
            | TileKind::Airport {
                price,
                mortgage_value,
            }
            | TileKind::Utility {
                price,
                mortgage_value,
            } => {
                if mortgage_value > 0 {
                    mortgage_value
                } else {
                    price / 2
                }
            }
            _ => 0,
        }
    }

    pub fn country(&self) -> Option<&str> {
        match &self.kind {
            TileKind::Property { country, .. } => Some(country.as_str()),
            _ => None,
        }
    }
}

/// Immutable lookup table of tiles indexed by position.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Board {
    tiles: Vec<Tile>,
}

/// Decoding goes through [`Board::new`], so a deserialized board is always well formed.
impl<'de> Deserialize<'de> for Board {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tiles = Vec::<Tile>::deserialize(deserializer)?;
        Board::new(tiles).map_err(serde::de::Error::custom)
    }
}

impl Board {
    /// Build a board from tiles, checking that ids match positions and a start tile exists.
    pub fn new(tiles: Vec<Tile>) -> Result<Self, BoardError> {
        if tiles.is_empty() {
            return Err(BoardError::Empty);
        }
        for (index, tile) in tiles.iter().enumerate() {
            if tile.id != index {
                return Err(BoardError::NonSequentialId {
                    expected: index,
                    found: tile.id,
                });
            }
        }
        if !matches!(tiles[0].kind, TileKind::Start { .. }) {
            return Err(BoardError::MissingStart);
        }
        Ok(Self { tiles })
    }

    /// Load a board from a JSON file containing an array of tiles.
    pub fn load_from_json<P: AsRef<Path>>(path: P) -> Result<Self, BoardError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| BoardError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let tiles: Vec<Tile> = serde_json::from_str(&contents).map_err(|e| BoardError::Parse {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::new(tiles)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn tile(&self, id: TileId) -> Option<&Tile> {
        self.tiles.get(id)
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn salary(&self) -> Money {
        match self.tiles.first().map(|t| &t.kind) {
            Some(TileKind::Start { salary }) if *salary > 0 => *salary,
            _ => DEFAULT_SALARY,
        }
    }

    pub fn jail_tile(&self) -> TileId {
        self.tiles
            .iter()
            .find(|t| matches!(t.kind, TileKind::Jail))
            .map(|t| t.id)
            .unwrap_or(DEFAULT_JAIL_TILE)
    }

    /// Ids of every property tile in the given country group.
    pub fn group(&self, country: &str) -> Vec<TileId> {
        self.tiles
            .iter()
            .filter(|t| t.country() == Some(country))
            .map(|t| t.id)
            .collect()
    }
}

impl Default for Board {
    fn default() -> Self {
        Self {
            tiles: default_tiles(),
        }
    }
}

fn property(
    id: TileId,
    name: &str,
    country: &str,
    price: Money,
    house_price: Money,
    rent: [Money; 6],
) -> Tile {
    Tile {
        id,
        name: name.to_string(),
        kind: TileKind::Property {
            country: country.to_string(),
            price,
            house_price,
            hotel_price: house_price,
            mortgage_value: price / 2,
            rent,
        },
    }
}

fn simple(id: TileId, name: &str, kind: TileKind) -> Tile {
    Tile {
        id,
        name: name.to_string(),
        kind,
    }
}

fn airport(id: TileId, name: &str) -> Tile {
    simple(
        id,
        name,
        TileKind::Airport {
            price: 200,
            mortgage_value: 100,
        },
    )
}

fn utility(id: TileId, name: &str) -> Tile {
    simple(
        id,
        name,
        TileKind::Utility {
            price: 150,
            mortgage_value: 75,
        },
    )
}

fn default_tiles() -> Vec<Tile> {
    vec![
        simple(0, "Start", TileKind::Start { salary: 200 }),
        property(1, "Rio de Janeiro", "Brazil", 60, 50, [2, 10, 30, 90, 160, 250]),
        simple(2, "Surprise", TileKind::Chance),
        property(3, "Sao Paulo", "Brazil", 60, 50, [4, 20, 60, 180, 320, 450]),
        simple(4, "Income Tax", TileKind::Tax { amount: 200 }),
        airport(5, "Heathrow Airport"),
        property(6, "Mumbai", "India", 100, 50, [6, 30, 90, 270, 400, 550]),
        simple(7, "Surprise", TileKind::Chance),
        property(8, "Delhi", "India", 100, 50, [6, 30, 90, 270, 400, 550]),
        property(9, "Bangalore", "India", 120, 50, [8, 40, 100, 300, 450, 600]),
        simple(10, "Jail", TileKind::Jail),
        property(11, "Osaka", "Japan", 140, 100, [10, 50, 150, 450, 625, 750]),
        utility(12, "Electric Company"),
        property(13, "Kyoto", "Japan", 140, 100, [10, 50, 150, 450, 625, 750]),
        property(14, "Tokyo", "Japan", 160, 100, [12, 60, 180, 500, 700, 900]),
        airport(15, "Haneda Airport"),
        property(16, "Munich", "Germany", 180, 100, [14, 70, 200, 550, 750, 950]),
        simple(17, "Treasury", TileKind::CommunityChest),
        property(18, "Hamburg", "Germany", 180, 100, [14, 70, 200, 550, 750, 950]),
        property(19, "Berlin", "Germany", 200, 100, [16, 80, 220, 600, 800, 1000]),
        simple(20, "Free Parking", TileKind::FreeParking),
        property(21, "Lyon", "France", 220, 150, [18, 90, 250, 700, 875, 1050]),
        simple(22, "Surprise", TileKind::Chance),
        property(23, "Nice", "France", 220, 150, [18, 90, 250, 700, 875, 1050]),
        property(24, "Paris", "France", 240, 150, [20, 100, 300, 750, 925, 1100]),
        airport(25, "JFK Airport"),
        property(26, "Manchester", "UK", 260, 150, [22, 110, 330, 800, 975, 1150]),
        property(27, "Liverpool", "UK", 260, 150, [22, 110, 330, 800, 975, 1150]),
        utility(28, "Water Works"),
        property(29, "London", "UK", 280, 150, [24, 120, 360, 850, 1025, 1200]),
        simple(30, "Go To Jail", TileKind::GoToJail),
        property(31, "Vancouver", "Canada", 300, 200, [26, 130, 390, 900, 1100, 1275]),
        property(32, "Montreal", "Canada", 300, 200, [26, 130, 390, 900, 1100, 1275]),
        simple(33, "Treasury", TileKind::CommunityChest),
        property(34, "Toronto", "Canada", 320, 200, [28, 150, 450, 1000, 1200, 1400]),
        airport(35, "Changi Airport"),
        simple(36, "Surprise", TileKind::Chance),
        property(37, "Los Angeles", "USA", 350, 200, [35, 175, 500, 1100, 1300, 1500]),
        simple(38, "Luxury Tax", TileKind::Tax { amount: 100 }),
        property(39, "New York", "USA", 400, 200, [50, 200, 600, 1400, 1700, 2000]),
    ]
}
