use std::collections::BTreeSet;

use crate::errors::AppError;
use crate::models::record::Column;

/// Snapshot of the destination table, taken once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationSchema {
    Missing { table: String },
    Present { table: String, columns: BTreeSet<String> },
}

impl DestinationSchema {
    pub fn present<I, S>(table: &str, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        DestinationSchema::Present {
            table: table.to_string(),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn table(&self) -> &str {
        match self {
            DestinationSchema::Missing { table } | DestinationSchema::Present { table, .. } => table,
        }
    }
}

/// The reconciled write: which columns to bind, in order, and the key an
/// incoming row collides on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WritePlan {
    pub columns: Vec<Column>,
    pub conflict_key: Vec<Column>,
}

impl WritePlan {
    pub fn includes(&self, column: Column) -> bool {
        self.columns.contains(&column)
    }

    /// Columns refreshed on conflict. Identity and insert-only metadata
    /// columns are never in this set.
    pub fn update_columns(&self) -> impl Iterator<Item = Column> + '_ {
        self.columns.iter().copied().filter(Column::is_mutable)
    }
}

/// Decide the column list for a write against `schema`.
///
/// Mandatory columns are always written and must all exist. `symbol`,
/// `currency` and `previous_close` are appended only when the destination
/// has them. Names compare case-insensitively, as SQLite identifiers do.
pub fn reconcile(schema: &DestinationSchema) -> Result<WritePlan, AppError> {
    let (table, columns) = match schema {
        DestinationSchema::Missing { table } => {
            return Err(AppError::DestinationTableMissing(table.clone()));
        }
        DestinationSchema::Present { table, columns } => (table, columns),
    };

    let has = |col: Column| columns.iter().any(|c| c.eq_ignore_ascii_case(col.as_str()));

    let missing: Vec<String> = Column::MANDATORY
        .iter()
        .filter(|c| !has(**c))
        .map(|c| c.as_str().to_string())
        .collect();
    if !missing.is_empty() {
        return Err(AppError::DestinationSchemaMissing {
            table: table.clone(),
            missing,
        });
    }

    let mut plan_columns = Column::MANDATORY.to_vec();
    plan_columns.extend(Column::OPTIONAL.iter().copied().filter(|c| has(*c)));

    let conflict_key = if plan_columns.contains(&Column::Symbol) {
        vec![Column::Symbol, Column::Date]
    } else {
        vec![Column::Date]
    };

    Ok(WritePlan {
        columns: plan_columns,
        conflict_key,
    })
}
