//! One text column per key, white keys first, filled by how far the lowest
//! tile in that lane has fallen.

use tiles_core::TileView;
use tiles_core::tuning::{KEY_COUNT, WHITE_KEY_COUNT};

const LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
const EMPTY: char = '·';

fn separator(index: usize) -> &'static str {
    if index == WHITE_KEY_COUNT as usize { " |" } else { "" }
}

/// Key numbers aligned with [`render`].
pub fn header() -> String {
    (0..KEY_COUNT as usize)
        .map(|i| format!("{}{:>3}", separator(i), i + 1))
        .collect()
}

pub fn render(tiles: &[TileView]) -> String {
    let mut lanes = [None::<f64>; KEY_COUNT as usize];
    for tile in tiles {
        let lane = &mut lanes[tile.token.key.number() as usize - 1];
        *lane = Some(lane.map_or(tile.progress, |p| p.max(tile.progress)));
    }

    lanes
        .iter()
        .enumerate()
        .map(|(i, lane)| {
            let cell = match lane {
                Some(progress) => {
                    let level = (progress.clamp(0.0, 1.0) * (LEVELS.len() - 1) as f64).round();
                    LEVELS[level as usize]
                }
                None => EMPTY,
            };
            format!("{}{:>3}", separator(i), cell)
        })
        .collect()
}
