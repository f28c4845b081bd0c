//! `queue` crate — resume tickets for suspended executions.
//!
//! A Delay node suspends an execution and hands a [`ResumeTicket`] to a
//! [`ResumeQueue`]. The resumption service later takes due tickets and asks
//! the scheduler to continue. Implementations must never hold pending delays
//! only in a process-local timer: the in-memory queue here is rebuilt from the
//! persisted suspended executions on startup, the Postgres queue in the `db`
//! crate is durable on its own.

pub mod error;
pub mod memory;
pub mod ticket;

pub use error::QueueError;
pub use memory::MemoryResumeQueue;
pub use ticket::{ResumeQueue, ResumeTicket};
