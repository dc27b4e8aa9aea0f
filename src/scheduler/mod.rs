pub mod plan;
pub mod runner;
pub mod status;

pub use plan::ChannelSchedule;
pub use runner::{ExitCause, Scheduler};
pub use status::{Presenter, Status};
