//! redb table definitions for the status store.

use redb::TableDefinition;

/// Completed job records keyed by job id.
pub const COMPLETED_JOBS: TableDefinition<&str, &[u8]> = TableDefinition::new("completed_jobs");
