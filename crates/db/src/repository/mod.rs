//! Repository functions — one function per database operation.
//!
//! Every function takes a pool (or an executor, when it must join a
//! transaction) and returns a `Result<T, DbError>`. Row structs in, row
//! structs out; conversion to domain types happens in [`crate::store`].

pub mod executions;
pub mod resume;
pub mod versions;
pub mod workflows;
