pub mod filter_controller;
pub mod land_cover;
pub mod layer_registry;
pub mod stats_renderer;
pub mod stats_store;
pub mod tile_source;
