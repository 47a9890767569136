pub mod clock;
pub mod schedule;
pub mod state;

pub use clock::*;
pub use schedule::*;
pub use state::*;
