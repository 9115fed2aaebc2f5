mod result_set;
mod row;

pub use result_set::ResultSet;
pub use row::CustomDbRow;

use serde::Serialize;

/// Outcome of a single write statement as reported by the driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    pub affected_rows: u64,
    /// First id generated by an `INSERT`, `0` when nothing was generated.
    pub insert_id: u64,
}

/// Summed result of an update or delete batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSetHeader {
    pub affected_rows: u64,
}

/// Insert result with the ids derived for every row of the batch.
///
/// `insert_ids` assumes the engine assigned contiguous auto-increment values, which holds when no
/// other writer interleaves with the batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedResultSetHeader {
    pub affected_rows: u64,
    pub insert_id: u64,
    pub insert_ids: Vec<u64>,
}

impl ExtendedResultSetHeader {
    #[must_use]
    pub fn from_outcome(outcome: ExecOutcome) -> Self {
        let insert_ids = if outcome.insert_id == 0 {
            Vec::new()
        } else {
            (outcome.insert_id..outcome.insert_id + outcome.affected_rows).collect()
        };
        Self {
            affected_rows: outcome.affected_rows,
            insert_id: outcome.insert_id,
            insert_ids,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_ids_are_contiguous_from_first_id() {
        let header = ExtendedResultSetHeader::from_outcome(ExecOutcome {
            affected_rows: 3,
            insert_id: 41,
        });
        assert_eq!(header.insert_ids, vec![41, 42, 43]);
    }

    #[test]
    fn no_generated_id_means_no_ids() {
        let header = ExtendedResultSetHeader::from_outcome(ExecOutcome {
            affected_rows: 2,
            insert_id: 0,
        });
        assert!(header.insert_ids.is_empty());
        assert_eq!(header.affected_rows, 2);
    }
}
