//! Rent calculation for owned tiles.

use super::board::{Board, Money, TileId, TileKind};
use super::player::{Development, Player};

/// Base airport rent with a single airport held; doubles for every extra one.
pub const AIRPORT_BASE_RENT: Money = 25;
/// Dice multiplier for a single utility.
pub const UTILITY_SINGLE_MULTIPLIER: Money = 4;
/// Dice multiplier when the owner holds two or more utilities.
pub const UTILITY_DOUBLE_MULTIPLIER: Money = 10;

/// True when `player` owns every property tile of `country`. An unknown or empty group
/// never counts as a monopoly.
pub fn has_monopoly(board: &Board, player: &Player, country: &str) -> bool {
    let group = board.group(country);
    !group.is_empty() && group.iter().all(|id| player.owns(*id))
}

/// Rent owed by a visitor landing on `tile_id` owned by `owner`.
/// `dice_total` only matters for utilities. Returns 0 for tiles that carry no rent.
pub fn rent(board: &Board, tile_id: TileId, owner: &Player, dice_total: u32) -> Money {
    let Some(tile) = board.tile(tile_id) else {
        return 0;
    };
    let Some(development) = owner.owned_properties.get(&tile_id) else {
        return 0;
    };
    match &tile.kind {
        TileKind::Property { country, rent, .. } => match development {
            Development::Hotel => rent[5],
            Development::Houses(n) => rent[usize::from((*n).min(4))],
            Development::Land => {
                if has_monopoly(board, owner, country) {
                    rent[0] * 2
                } else {
                    rent[0]
                }
            }
        },
        TileKind::Airport { .. } => {
            let held = count_owned(board, owner, |k| matches!(k, TileKind::Airport { .. }));
            AIRPORT_BASE_RENT << held.saturating_sub(1).min(8)
        }
        TileKind::Utility { .. } => {
            let held = count_owned(board, owner, |k| matches!(k, TileKind::Utility { .. }));
            let multiplier = if held >= 2 {
                UTILITY_DOUBLE_MULTIPLIER
            } else {
                UTILITY_SINGLE_MULTIPLIER
            };
            Money::from(dice_total) * multiplier
        }
        TileKind::Start { .. }
        | TileKind::Tax { .. }
        | TileKind::Chance
        | TileKind::CommunityChest
        | TileKind::Jail
        | TileKind::GoToJail
        | TileKind::FreeParking => 0,
    }
}

fn count_owned(board: &Board, owner: &Player, pred: impl Fn(&TileKind) -> bool) -> usize {
    owner
        .owned_properties
        .keys()
        .filter_map(|id| board.tile(*id))
        .filter(|t| pred(&t.kind))
        .count()
}
