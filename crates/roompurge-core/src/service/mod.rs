//! Application services built on the repository and bus ports.
//!
//! - `forget` -- forget coordinator (room-state side)
//! - `purge` -- purge consumer (account-data side)
//! - `sweep` -- periodic re-publication of missed purges
//! - `tasks` -- supervisor for detached background work

pub mod forget;
pub mod purge;
pub mod sweep;
pub mod tasks;

pub use forget::{ForgetService, publish_purge};
pub use purge::{Disposition, PurgeConsumer};
pub use sweep::PurgeSweeper;
pub use tasks::BackgroundTasks;
