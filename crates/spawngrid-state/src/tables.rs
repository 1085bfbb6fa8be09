//! redb table definitions for the session store.

use redb::TableDefinition;

/// Session records keyed by `{tenant}/{session}`.
pub const SESSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("sessions");
