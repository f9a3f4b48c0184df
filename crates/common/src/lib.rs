// taiga-sync-common: update payload decoding and template rendering

pub mod payload;
pub mod render;
