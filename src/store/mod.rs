//! Persistence layer. libSQL-backed storage for raw messages, codes and
//! repeat-gate counters.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{Database, GateRecord, NewCode, RawMessage, StoredCode};
