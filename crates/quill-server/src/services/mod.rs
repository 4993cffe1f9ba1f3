//! Request-scoped services.

pub mod completion;
