//! # UI Module
//!
//! Terminal presentation of the game: the lane view of falling tiles and the
//! HUD lines printed around it.

pub mod hud;
pub mod lanes;
