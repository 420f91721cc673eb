pub mod order;
pub mod position;
pub mod signal;
pub mod state;

pub use order::*;
pub use position::*;
pub use signal::*;
pub use state::*;
