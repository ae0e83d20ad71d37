pub mod migrations;
pub mod state;
pub mod store;

pub use state::*;
pub use store::*;
