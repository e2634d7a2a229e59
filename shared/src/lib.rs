pub mod events;
pub mod map;

pub use events::*;
pub use map::*;
