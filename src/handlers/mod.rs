pub mod health;
pub mod map;
pub mod performance;
pub mod projection;
pub mod remap;

pub use health::hello;
pub use map::get_map;
pub use performance::get_performance;
pub use projection::create_projection;
pub use remap::remap_projection;
