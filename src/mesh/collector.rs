//! Assembly of the full vector on the coordinating process.

use crate::error::Result;

use super::block::alloc_zeroed;
use super::comm::CommunicationBackend;
use super::groups::{CommunicatorGroups, LEADER};

/// Gathers the column leaders' slices onto process (0, 0).
///
/// The column leaders are exactly the members of row 0, and their rank
/// in that row's group is their column coordinate, so a gather over the
/// first row's group lines the slices up in column order.
pub struct ResultCollector<'a, C> {
    groups: &'a CommunicatorGroups<C>,
}

impl<'a, C: CommunicationBackend> ResultCollector<'a, C> {
    pub fn new(groups: &'a CommunicatorGroups<C>) -> Self {
        Self { groups }
    }

    /// Collect `slice` from every column leader.
    ///
    /// Returns the full vector on (0, 0) and `None` everywhere else.
    /// Collective over the first row; other processes return at once.
    pub fn gather(&self, slice: &[i64]) -> Result<Option<Vec<i64>>> {
        if !self.groups.is_col_leader() {
            return Ok(None);
        }
        let row = self.groups.row();
        if row.rank() != LEADER {
            row.gather(slice, &mut [], LEADER)?;
            return Ok(None);
        }
        let mut full = alloc_zeroed(slice.len() * row.num_ranks())?;
        row.gather(slice, &mut full, LEADER)?;
        Ok(Some(full))
    }
}
