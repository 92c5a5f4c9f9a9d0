//! Domain types: stable identifiers, Task/Subtask, and Worker Slot/Provider.

pub mod id;
pub mod task;
pub mod worker;

pub use id::{DomainId, IdResolver};
pub use task::{LastErrorKind, Subtask, Task, TaskStatus};
pub use worker::{Provider, SlotState, WorkerSlot};
