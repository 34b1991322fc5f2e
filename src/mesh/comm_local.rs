//! In-process communication backend: one OS thread per rank.
//!
//! Ranks exchange owned `Vec<i64>` payloads over `std::sync::mpsc`
//! channels, one inbox per rank. Messages are matched on
//! (communicator context, source, tag) like MPI; anything that arrives
//! early is parked in a pending queue until a matching receive asks for
//! it. Collectives are built from point-to-point traffic with reserved
//! negative tags, so they never collide with caller tags.
//!
//! `LocalMesh::run` plays the role of `mpirun`: it starts every rank,
//! and if one rank fails it tears the whole job down so the others do
//! not block forever on a peer that is gone.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use crate::error::{MeshError, Result};

use super::comm::CommunicationBackend;

const WORLD_CONTEXT: u64 = 0;

const TAG_REDUCE: i32 = -1;
const TAG_BROADCAST: i32 = -2;
const TAG_GATHER: i32 = -3;
const TAG_BARRIER: i32 = -4;

struct Message {
    context: u64,
    source: usize,
    tag: i32,
    payload: Vec<i64>,
}

impl Message {
    fn matches(&self, context: u64, source: usize, tag: i32) -> bool {
        self.context == context && self.source == source && self.tag == tag
    }
}

enum Packet {
    Data(Message),
    Abort { origin: usize },
}

/// State shared by every rank of one mesh: the outgoing channel ends and
/// the registry of communicator contexts.
struct Fabric {
    outboxes: Vec<Sender<Packet>>,
    contexts: Mutex<HashMap<(u64, u64, usize), u64>>,
    next_context: AtomicU64,
    first_failure: Mutex<Option<usize>>,
}

impl Fabric {
    /// Context id for the sub-group `color` of the `sequence`-th split of
    /// `parent`. Every member of the sub-group gets the same id.
    fn context_for(&self, parent: u64, sequence: u64, color: usize) -> u64 {
        let mut contexts = lock(&self.contexts);
        *contexts
            .entry((parent, sequence, color))
            .or_insert_with(|| self.next_context.fetch_add(1, Ordering::Relaxed))
    }

    fn post(&self, dest: usize, message: Message) -> Result<()> {
        let outbox = self.outboxes.get(dest).ok_or_else(|| {
            MeshError::Communication(format!("rank {dest} is not part of the mesh"))
        })?;
        outbox
            .send(Packet::Data(message))
            .map_err(|_| MeshError::Communication(format!("rank {dest} has left the mesh")))
    }

    fn abort(&self, origin: usize) {
        lock(&self.first_failure).get_or_insert(origin);
        for outbox in &self.outboxes {
            // A closed inbox belongs to a rank that already finished.
            let _ = outbox.send(Packet::Abort { origin });
        }
    }

    fn first_failure(&self) -> Option<usize> {
        *lock(&self.first_failure)
    }
}

struct InboxState {
    receiver: Receiver<Packet>,
    pending: VecDeque<Message>,
    aborted_by: Option<usize>,
}

/// Receiving end of one rank. Shared by every communicator that rank
/// derives from its world communicator.
struct Inbox {
    state: Mutex<InboxState>,
}

impl Inbox {
    fn take(&self, context: u64, source: usize, tag: i32) -> Result<Vec<i64>> {
        let mut state = lock(&self.state);
        if let Some(origin) = state.aborted_by {
            return Err(aborted(origin));
        }
        if let Some(pos) = state
            .pending
            .iter()
            .position(|m| m.matches(context, source, tag))
        {
            if let Some(message) = state.pending.remove(pos) {
                return Ok(message.payload);
            }
        }
        loop {
            let packet = state.receiver.recv();
            match packet {
                Ok(Packet::Data(message)) if message.matches(context, source, tag) => {
                    return Ok(message.payload);
                }
                Ok(Packet::Data(message)) => state.pending.push_back(message),
                Ok(Packet::Abort { origin }) => {
                    state.aborted_by = Some(origin);
                    return Err(aborted(origin));
                }
                Err(_) => {
                    return Err(MeshError::Communication("message fabric closed".into()));
                }
            }
        }
    }
}

fn aborted(origin: usize) -> MeshError {
    MeshError::Communication(format!("run aborted after rank {origin} failed"))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Thread-backed communicator.
///
/// Group ranks are translated to world ranks through `members`, so a
/// row or column communicator addresses its peers by their position in
/// the group.
pub struct LocalComm {
    fabric: Arc<Fabric>,
    inbox: Arc<Inbox>,
    context: u64,
    members: Arc<[usize]>,
    rank: usize,
    splits: AtomicU64,
}

impl LocalComm {
    /// Rank of this process in the mesh-wide communicator.
    pub fn world_rank(&self) -> usize {
        self.members[self.rank]
    }

    fn peer(&self, rank: usize) -> Result<usize> {
        self.members.get(rank).copied().ok_or_else(|| {
            MeshError::Communication(format!(
                "rank {rank} outside a group of {}",
                self.members.len()
            ))
        })
    }

    fn post_to(&self, rank: usize, tag: i32, payload: Vec<i64>) -> Result<()> {
        let dest = self.peer(rank)?;
        self.fabric.post(
            dest,
            Message {
                context: self.context,
                source: self.world_rank(),
                tag,
                payload,
            },
        )
    }

    fn take_from(&self, rank: usize, tag: i32, expected_len: usize) -> Result<Vec<i64>> {
        let source = self.peer(rank)?;
        let payload = self.inbox.take(self.context, source, tag)?;
        if payload.len() != expected_len {
            return Err(MeshError::Communication(format!(
                "message from rank {rank} (tag {tag}) has {} elements, expected {expected_len}",
                payload.len()
            )));
        }
        Ok(payload)
    }
}

impl CommunicationBackend for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn num_ranks(&self) -> usize {
        self.members.len()
    }

    fn split(&self, color: usize, key: usize) -> Result<Self> {
        let sequence = self.splits.fetch_add(1, Ordering::Relaxed);
        let size = self.num_ranks();

        let mut table = vec![0i64; 2 * size];
        self.gather(&[color as i64, key as i64], &mut table, 0)?;
        self.broadcast(&mut table, 0)?;

        let mut group: Vec<(i64, usize)> = table
            .chunks_exact(2)
            .enumerate()
            .filter(|(_, entry)| entry[0] == color as i64)
            .map(|(rank, entry)| (entry[1], rank))
            .collect();
        group.sort_unstable();

        let rank = group
            .iter()
            .position(|&(_, r)| r == self.rank)
            .ok_or_else(|| MeshError::Communication("split lost the calling rank".into()))?;
        let members: Vec<usize> = group.iter().map(|&(_, r)| self.members[r]).collect();

        Ok(Self {
            fabric: Arc::clone(&self.fabric),
            inbox: Arc::clone(&self.inbox),
            context: self.fabric.context_for(self.context, sequence, color),
            members: members.into(),
            rank,
            splits: AtomicU64::new(0),
        })
    }

    fn duplicate(&self) -> Result<Self> {
        self.split(0, self.rank)
    }

    fn reduce_sum(&self, local: &[i64], result: &mut [i64], root: usize) -> Result<()> {
        self.peer(root)?;
        if self.rank != root {
            return self.post_to(root, TAG_REDUCE, local.to_vec());
        }
        if result.len() != local.len() {
            return Err(MeshError::Communication(format!(
                "reduce buffer length mismatch: expected {}, got {}",
                local.len(),
                result.len()
            )));
        }
        result.copy_from_slice(local);
        for rank in (0..self.num_ranks()).filter(|&r| r != root) {
            let partial = self.take_from(rank, TAG_REDUCE, local.len())?;
            for (acc, value) in result.iter_mut().zip(partial) {
                *acc = acc.wrapping_add(value);
            }
        }
        Ok(())
    }

    fn broadcast(&self, data: &mut [i64], root: usize) -> Result<()> {
        self.peer(root)?;
        if self.rank == root {
            for rank in (0..self.num_ranks()).filter(|&r| r != root) {
                self.post_to(rank, TAG_BROADCAST, data.to_vec())?;
            }
            return Ok(());
        }
        let payload = self.take_from(root, TAG_BROADCAST, data.len())?;
        data.copy_from_slice(&payload);
        Ok(())
    }

    fn gather(&self, local: &[i64], result: &mut [i64], root: usize) -> Result<()> {
        self.peer(root)?;
        if self.rank != root {
            return self.post_to(root, TAG_GATHER, local.to_vec());
        }
        let chunk = local.len();
        if result.len() != chunk * self.num_ranks() {
            return Err(MeshError::Communication(format!(
                "gather buffer holds {} elements, expected {}",
                result.len(),
                chunk * self.num_ranks()
            )));
        }
        for (rank, slot) in result.chunks_exact_mut(chunk.max(1)).enumerate() {
            if rank == root {
                slot.copy_from_slice(local);
            } else {
                slot.copy_from_slice(&self.take_from(rank, TAG_GATHER, chunk)?);
            }
        }
        Ok(())
    }

    fn send(&self, data: &[i64], dest: usize, tag: i32) -> Result<()> {
        if tag < 0 {
            return Err(MeshError::Communication(format!("tag {tag} is reserved")));
        }
        self.post_to(dest, tag, data.to_vec())
    }

    fn receive(&self, data: &mut [i64], source: usize, tag: i32) -> Result<()> {
        let payload = self.take_from(source, tag, data.len())?;
        data.copy_from_slice(&payload);
        Ok(())
    }

    fn barrier(&self) -> Result<()> {
        if self.rank == 0 {
            for rank in 1..self.num_ranks() {
                self.take_from(rank, TAG_BARRIER, 0)?;
            }
            for rank in 1..self.num_ranks() {
                self.post_to(rank, TAG_BARRIER, Vec::new())?;
            }
            Ok(())
        } else {
            self.post_to(0, TAG_BARRIER, Vec::new())?;
            self.take_from(0, TAG_BARRIER, 0).map(|_| ())
        }
    }
}

/// Launcher for a mesh of thread-backed ranks.
pub struct LocalMesh;

impl LocalMesh {
    /// World communicators for `procs` ranks, index = rank.
    ///
    /// Each communicator must be driven by its own thread.
    pub fn communicators(procs: usize) -> Vec<LocalComm> {
        let (outboxes, receivers): (Vec<_>, Vec<_>) = (0..procs).map(|_| channel()).unzip();
        let fabric = Arc::new(Fabric {
            outboxes,
            contexts: Mutex::new(HashMap::new()),
            next_context: AtomicU64::new(WORLD_CONTEXT + 1),
            first_failure: Mutex::new(None),
        });
        let members: Arc<[usize]> = (0..procs).collect::<Vec<_>>().into();

        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, receiver)| LocalComm {
                fabric: Arc::clone(&fabric),
                inbox: Arc::new(Inbox {
                    state: Mutex::new(InboxState {
                        receiver,
                        pending: VecDeque::new(),
                        aborted_by: None,
                    }),
                }),
                context: WORLD_CONTEXT,
                members: Arc::clone(&members),
                rank,
                splits: AtomicU64::new(0),
            })
            .collect()
    }

    /// Run `body` once per rank, each on its own thread, and collect the
    /// per-rank results in rank order.
    ///
    /// If any rank returns an error or panics, the remaining ranks are
    /// released with a communication failure and the error of the rank
    /// that failed first is returned.
    pub fn run<T, F>(procs: usize, body: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(LocalComm) -> Result<T> + Sync,
    {
        if procs == 0 {
            return Err(MeshError::Configuration("a mesh needs at least one rank".into()));
        }
        let comms = Self::communicators(procs);
        let fabric = Arc::clone(&comms[0].fabric);
        let body = &body;

        let outcomes: Vec<Result<T>> = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(procs);
            for comm in comms {
                let rank = comm.rank;
                let guard = AbortOnFailure {
                    fabric: Arc::clone(&fabric),
                    rank,
                    armed: true,
                };
                let spawned = thread::Builder::new()
                    .name(format!("rank-{rank}"))
                    .spawn_scoped(scope, move || {
                        let mut guard = guard;
                        let outcome = body(comm);
                        guard.armed = outcome.is_err();
                        outcome
                    });
                match spawned {
                    Ok(handle) => handles.push((rank, handle)),
                    Err(e) => {
                        fabric.abort(rank);
                        handles.clear();
                        return vec![Err(MeshError::ResourceExhaustion(format!(
                            "cannot spawn thread for rank {rank}: {e}"
                        )))];
                    }
                }
            }
            handles
                .into_iter()
                .map(|(rank, handle)| {
                    handle.join().unwrap_or_else(|_| {
                        Err(MeshError::Communication(format!("rank {rank} panicked")))
                    })
                })
                .collect()
        });

        let mut results = Vec::with_capacity(procs);
        let mut errors = Vec::new();
        for (rank, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(value) => results.push(value),
                Err(e) => errors.push((rank, e)),
            }
        }
        if errors.is_empty() {
            return Ok(results);
        }
        let culprit = fabric.first_failure();
        let pos = errors
            .iter()
            .position(|(rank, _)| Some(*rank) == culprit)
            .unwrap_or(0);
        Err(errors.swap_remove(pos).1)
    }
}

/// Tears the mesh down when a rank exits without success, including by
/// panic.
struct AbortOnFailure {
    fabric: Arc<Fabric>,
    rank: usize,
    armed: bool,
}

impl Drop for AbortOnFailure {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!(rank = self.rank, "rank failed, aborting mesh");
            self.fabric.abort(self.rank);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduce_sums_at_root_only() {
        let results = LocalMesh::run(3, |comm| {
            let local = vec![comm.rank() as i64 + 1; 2];
            let mut result = vec![-1i64; 2];
            comm.reduce_sum(&local, &mut result, 1)?;
            Ok(result)
        })
        .unwrap();
        assert_eq!(results[1], vec![6, 6]);
        assert_eq!(results[0], vec![-1, -1]);
        assert_eq!(results[2], vec![-1, -1]);
    }

    #[test]
    fn broadcast_reaches_every_rank() {
        let results = LocalMesh::run(4, |comm| {
            let mut data = if comm.rank() == 2 { vec![7, 8, 9] } else { vec![0; 3] };
            comm.broadcast(&mut data, 2)?;
            Ok(data)
        })
        .unwrap();
        assert!(results.iter().all(|d| d == &vec![7, 8, 9]));
    }

    #[test]
    fn gather_orders_by_rank() {
        let results = LocalMesh::run(3, |comm| {
            let r = comm.rank() as i64;
            let mut all = vec![0i64; 6];
            comm.gather(&[r, r * 10], &mut all, 0)?;
            Ok(all)
        })
        .unwrap();
        assert_eq!(results[0], vec![0, 0, 1, 10, 2, 20]);
    }

    #[test]
    fn split_orders_members_by_key() {
        let results = LocalMesh::run(4, |comm| {
            // Two groups by parity, reversed order inside each group.
            let sub = comm.split(comm.rank() % 2, 10 - comm.rank())?;
            let mut tags = vec![0i64; sub.num_ranks()];
            sub.gather(&[comm.rank() as i64], &mut tags, 0)?;
            sub.broadcast(&mut tags, 0)?;
            Ok((sub.rank(), tags))
        })
        .unwrap();
        assert_eq!(results[0], (1, vec![2, 0]));
        assert_eq!(results[2], (0, vec![2, 0]));
        assert_eq!(results[1], (1, vec![3, 1]));
        assert_eq!(results[3], (0, vec![3, 1]));
    }

    #[test]
    fn tagged_messages_match_out_of_order() {
        let results = LocalMesh::run(2, |comm| {
            if comm.rank() == 0 {
                comm.send(&[1], 1, 5)?;
                comm.send(&[2], 1, 6)?;
                Ok(vec![])
            } else {
                let mut second = [0i64; 1];
                let mut first = [0i64; 1];
                comm.receive(&mut second, 0, 6)?;
                comm.receive(&mut first, 0, 5)?;
                Ok(vec![first[0], second[0]])
            }
        })
        .unwrap();
        assert_eq!(results[1], vec![1, 2]);
    }

    #[test]
    fn duplicate_isolates_traffic() {
        let results = LocalMesh::run(2, |comm| {
            let dup = comm.duplicate()?;
            if comm.rank() == 0 {
                dup.send(&[11], 1, 3)?;
                comm.send(&[22], 1, 3)?;
                Ok(0)
            } else {
                let mut buf = [0i64; 1];
                comm.receive(&mut buf, 0, 3)?;
                Ok(buf[0])
            }
        })
        .unwrap();
        assert_eq!(results[1], 22);
    }

    #[test]
    fn barrier_completes_on_all_ranks() {
        let results = LocalMesh::run(5, |comm| {
            comm.barrier()?;
            comm.barrier()?;
            Ok(comm.rank())
        })
        .unwrap();
        assert_eq!(results, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn failing_rank_releases_blocked_peers() {
        let err = LocalMesh::run(3, |comm| {
            if comm.rank() == 2 {
                return Err(MeshError::Configuration("rank 2 refuses".into()));
            }
            comm.barrier()?;
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(err, MeshError::Configuration(_)));
    }

    #[test]
    fn zero_ranks_is_a_configuration_error() {
        let err = LocalMesh::run(0, |_comm| Ok(())).unwrap_err();
        assert!(matches!(err, MeshError::Configuration(_)));
    }
}
