//! TCP operations: connection setup/teardown and the ring-buffered
//! recv/send drivers behind the stream adapter.

mod ops;

pub use ops::{accept, bind, connect, create, delay, listen, set_delay};

pub(crate) use ops::{buffered_read, buffered_write};
