// diff.rs — Row-count summary of the difference between two refs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Changed-row counts for one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDiff {
    pub table: String,
    pub added: u64,
    pub modified: u64,
    pub removed: u64,
}

impl TableDiff {
    pub fn total(&self) -> u64 {
        self.added + self.modified + self.removed
    }
}

/// What a ref changes relative to a base, table by table.
///
/// `Display` renders a markdown table suitable for a review description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub base: String,
    pub target: String,
    pub tables: Vec<TableDiff>,
}

impl DiffSummary {
    pub fn is_empty(&self) -> bool {
        self.tables.iter().all(|t| t.total() == 0)
    }
}

impl fmt::Display for DiffSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return writeln!(f, "_No row changes between `{}` and `{}`._", self.base, self.target);
        }
        writeln!(f, "| table | added | modified | removed |")?;
        writeln!(f, "|---|---:|---:|---:|")?;
        for t in self.tables.iter().filter(|t| t.total() > 0) {
            writeln!(
                f,
                "| `{}` | {} | {} | {} |",
                t.table, t.added, t.modified, t.removed
            )?;
        }
        Ok(())
    }
}
