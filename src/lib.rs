//! Root package: re-exports the library so integration tests and the
//! binary share one path (`tabula::...`).

pub use tabula_lib::*;
