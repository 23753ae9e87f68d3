//! Test fixtures and mock venue adapters.
//!
//! Available to unit tests and, behind the `testkit` feature, to
//! integration tests (the crate dev-depends on itself with that feature
//! enabled).

pub mod discovery;
pub mod domain;
pub mod stream;
