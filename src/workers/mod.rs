pub mod callback_sweeper;

pub use callback_sweeper::{CallbackSweeper, CallbackSweeperConfig};
