//! Row and column communicators over the process mesh.

use crate::error::{MeshError, Result};

use super::comm::CommunicationBackend;
use super::grid::{Coords, MeshContext, ProcessGrid};

/// Rank of the leader inside every row and column group.
pub const LEADER: usize = 0;

/// Tag of the leader relay messages on the mesh-wide communicator.
pub const VECTOR_COLUMN_RESULT: i32 = 12;

/// The three communicators one process uses during a run.
///
/// Inside the row group a process's rank is its column coordinate; inside
/// the column group it is its row coordinate. The row leader therefore
/// sits in column 0 and the column leader in row 0.
pub struct CommunicatorGroups<C> {
    ctx: MeshContext,
    row: C,
    col: C,
    mesh: C,
}

impl<C: CommunicationBackend> CommunicatorGroups<C> {
    /// Split `world` into row and column groups. Collective over `world`.
    ///
    /// The mesh-wide communicator is a duplicate of `world`, keeping the
    /// leader relay's point-to-point traffic apart from anything else the
    /// caller does on `world`.
    pub fn build(world: &C, grid: ProcessGrid) -> Result<Self> {
        if world.num_ranks() != grid.procs() {
            return Err(MeshError::Configuration(format!(
                "communicator has {} ranks but the mesh needs {}",
                world.num_ranks(),
                grid.procs()
            )));
        }
        let ctx = MeshContext::new(grid, world.rank())?;
        let Coords { row, col } = ctx.coords;

        let mesh = world.duplicate()?;
        let row_comm = world.split(row, col)?;
        let col_comm = world.split(col, row)?;

        tracing::debug!(
            rank = ctx.rank,
            row,
            col,
            row_rank = row_comm.rank(),
            col_rank = col_comm.rank(),
            "communicator groups built"
        );

        Ok(Self {
            ctx,
            row: row_comm,
            col: col_comm,
            mesh,
        })
    }

    pub fn context(&self) -> &MeshContext {
        &self.ctx
    }

    /// Processes sharing this process's row coordinate.
    pub fn row(&self) -> &C {
        &self.row
    }

    /// Processes sharing this process's column coordinate.
    pub fn col(&self) -> &C {
        &self.col
    }

    /// Every process in the mesh.
    pub fn mesh(&self) -> &C {
        &self.mesh
    }

    /// Receives the row reduction (column coordinate 0).
    pub fn is_row_leader(&self) -> bool {
        self.row.rank() == LEADER
    }

    /// Originates the column broadcast (row coordinate 0).
    pub fn is_col_leader(&self) -> bool {
        self.col.rank() == LEADER
    }

    /// Move `buf` from each row leader (r, 0) to the column leader
    /// (0, r) of the matching column.
    ///
    /// The process at (r, 0) sends, its partner (0, r) receives into
    /// `buf`. (0, 0) is its own partner and exchanges nothing; processes
    /// off the first row and column return at once.
    pub fn transpose_exchange(&self, buf: &mut [i64]) -> Result<()> {
        let grid = self.ctx.grid;
        let here = self.ctx.coords;
        let Some(partner) = grid.transpose_partner(here) else {
            return Ok(());
        };
        if partner == here {
            return Ok(());
        }
        let peer = grid.rank_at(partner);
        if here.col == 0 {
            tracing::debug!(rank = self.ctx.rank, peer, "relaying row result");
            self.mesh.send(buf, peer, VECTOR_COLUMN_RESULT)
        } else {
            tracing::debug!(rank = self.ctx.rank, peer, "receiving relayed row result");
            self.mesh.receive(buf, peer, VECTOR_COLUMN_RESULT)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::comm::SingleProcessComm;
    use crate::mesh::comm_local::LocalMesh;

    #[test]
    fn single_process_leads_both_groups() {
        let grid = ProcessGrid::build(1).unwrap();
        let groups = CommunicatorGroups::build(&SingleProcessComm, grid).unwrap();
        assert_eq!(groups.row().num_ranks(), 1);
        assert_eq!(groups.col().num_ranks(), 1);
        assert!(groups.is_row_leader() && groups.is_col_leader());
    }

    #[test]
    fn group_ranks_follow_coordinates() {
        let grid = ProcessGrid::build(9).unwrap();
        let layout = LocalMesh::run(9, |world| {
            let groups = CommunicatorGroups::build(&world, grid)?;
            let c = groups.context().coords;
            Ok((
                c,
                groups.row().rank(),
                groups.row().num_ranks(),
                groups.col().rank(),
                groups.col().num_ranks(),
                groups.is_row_leader(),
                groups.is_col_leader(),
            ))
        })
        .unwrap();

        for (c, row_rank, row_size, col_rank, col_size, row_leader, col_leader) in layout {
            assert_eq!(row_rank, c.col);
            assert_eq!(col_rank, c.row);
            assert_eq!((row_size, col_size), (3, 3));
            assert_eq!(row_leader, c.col == 0);
            assert_eq!(col_leader, c.row == 0);
        }
    }

    #[test]
    fn row_members_share_a_row() {
        let grid = ProcessGrid::build(4).unwrap();
        let members = LocalMesh::run(4, |world| {
            let groups = CommunicatorGroups::build(&world, grid)?;
            let mut rows = vec![0i64; 2];
            groups
                .row()
                .gather(&[groups.context().rank as i64], &mut rows, LEADER)?;
            groups.row().broadcast(&mut rows, LEADER)?;
            Ok(rows)
        })
        .unwrap();
        assert_eq!(members, vec![vec![0, 1], vec![0, 1], vec![2, 3], vec![2, 3]]);
    }

    #[test]
    fn transpose_exchange_moves_first_column_to_first_row() {
        let grid = ProcessGrid::build(9).unwrap();
        let held = LocalMesh::run(9, |world| {
            let groups = CommunicatorGroups::build(&world, grid)?;
            let c = groups.context().coords;
            let mut buf = if c.col == 0 { vec![c.row as i64 * 100] } else { vec![-1] };
            groups.transpose_exchange(&mut buf)?;
            Ok((c, buf[0]))
        })
        .unwrap();
        for (c, value) in held {
            match (c.row, c.col) {
                (0, col) => assert_eq!(value, col as i64 * 100),
                (row, 0) => assert_eq!(value, row as i64 * 100),
                _ => assert_eq!(value, -1),
            }
        }
    }

    #[test]
    fn world_size_must_match_grid() {
        let grid = ProcessGrid::build(4).unwrap();
        let err = LocalMesh::run(1, |world| CommunicatorGroups::build(&world, grid).map(|_| ()))
            .unwrap_err();
        assert!(matches!(err, MeshError::Configuration(_)));
    }
}
