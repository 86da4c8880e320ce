//! Backend record shapes and the errand view model for `DailyDone`.
//!
//! [`task`] holds the fixed internal shape; [`normalize`] maps whatever the
//! REST backend sends into it.

pub mod normalize;
pub mod task;

pub use normalize::{normalize_task, normalize_task_list};
pub use task::{Assignment, Category, Location, Profile, Task, TaskId, TaskStatus};
