//! Sunlight and mineral fields as functions of the grid row.
//!
//! Both fields are pure functions of the configuration and `y`, total on
//! `0..H`: sunlight is strongest at the top row and fades in bands of
//! `SUN_LEVEL_HEIGHT` rows, minerals mirror it from the bottom up.

use crate::WorldConfig;

/// Sunlight available at row `y`.
#[inline]
#[must_use]
pub fn sun_at(config: &WorldConfig, y: u32) -> u32 {
    config.sun_amount.saturating_sub(y / config.sun_level_height)
}

/// Minerals deposited per tick at row `y`.
#[inline]
#[must_use]
pub fn mineral_at(config: &WorldConfig, y: u32) -> u32 {
    config
        .mineral_amount
        .saturating_sub((config.world_height - 1 - y) / config.mineral_level_height)
}
