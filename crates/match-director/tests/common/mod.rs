#![allow(dead_code)]

use core::time::Duration;
use futures::stream;
use match_director::director::{
    allocator::{Allocator, ConnectionHandle},
    backend::{BackendApi, MatchStream},
    backoff::BackoffPolicy,
    pipeline::DirectorSettings,
};
use match_director_core::{
    Error, Result,
    proto::{self, Assignments, MatchObject, Player, PlayerPool, Roster, Stats},
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;
use tonic::Status;

pub type Item = core::result::Result<MatchObject, Status>;

pub fn profile(id: &str) -> MatchObject {
    MatchObject {
        id: id.to_string(),
        properties: format!(r#"{{"name":"{id}"}}"#),
        ..Default::default()
    }
}

/// A valid candidate whose players are named `<id>-p0`, `<id>-p1`, ...
pub fn candidate(id: &str) -> MatchObject {
    MatchObject {
        id: id.to_string(),
        properties: r#"{"teams":2}"#.to_string(),
        rosters: vec![
            Roster {
                name: "red".to_string(),
                players: vec![player(&format!("{id}-p0"))],
            },
            Roster {
                name: "blue".to_string(),
                players: vec![player(&format!("{id}-p1"))],
            },
        ],
        ..Default::default()
    }
}

pub fn flagged(id: &str, error: &str) -> MatchObject {
    MatchObject {
        error: error.to_string(),
        ..candidate(id)
    }
}

pub fn malformed(id: &str) -> MatchObject {
    MatchObject {
        properties: "{ broken".to_string(),
        ..candidate(id)
    }
}

pub fn population(count: i64) -> MatchObject {
    MatchObject {
        id: "population".to_string(),
        pools: vec![PlayerPool {
            name: "defaultPool".to_string(),
            stats: Some(Stats {
                count,
                elapsed: 0.01,
            }),
            ..Default::default()
        }],
        ..Default::default()
    }
}

fn player(id: &str) -> Player {
    Player {
        id: id.to_string(),
        ..Default::default()
    }
}

pub fn settings(max_sends: Option<usize>, max_matches_per_send: Option<usize>) -> DirectorSettings {
    DirectorSettings {
        max_sends,
        max_matches_per_send,
        sleep_between_sends: Duration::from_secs(30),
        wait_between_startups: Duration::ZERO,
        backoff: BackoffPolicy::default(),
    }
}

/// Closes a session's slot when the stream is dropped.
struct SessionGuard {
    closed: Arc<AtomicUsize>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// In-memory backend.
///
/// Every profile owns one queue shared by all of its sessions. Items are only
/// taken from the queue when the consumer polls for them, so anything left
/// behind after an early close was never observed.
#[derive(Default)]
pub struct FakeBackend {
    pub queues: Mutex<HashMap<String, Arc<Mutex<VecDeque<Item>>>>>,
    pub opened: Mutex<Vec<String>>,
    pub closed: Arc<AtomicUsize>,
    pub pulled: Arc<AtomicUsize>,
    pub assignments: Mutex<Vec<Assignments>>,
    pub deleted: Mutex<Vec<MatchObject>>,
    pub refuse_open: bool,
    pub fail_assignments: bool,
    pub fail_deletes: bool,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, profile: &str, item: Item) {
        let queue = self.queue(profile);
        queue.lock().unwrap().push_back(item);
    }

    pub fn push_matches(&self, profile: &str, matches: impl IntoIterator<Item = MatchObject>) {
        for m in matches {
            self.push(profile, Ok(m));
        }
    }

    pub fn remaining(&self, profile: &str) -> usize {
        self.queue(profile).lock().unwrap().len()
    }

    pub fn sessions_closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn deleted_ids(&self) -> Vec<String> {
        self.deleted.lock().unwrap().iter().map(|m| m.id.clone()).collect()
    }

    fn queue(&self, profile: &str) -> Arc<Mutex<VecDeque<Item>>> {
        self.queues
            .lock()
            .unwrap()
            .entry(profile.to_string())
            .or_default()
            .clone()
    }
}

#[tonic::async_trait]
impl BackendApi for FakeBackend {
    async fn list_matches(&self, profile: MatchObject) -> Result<MatchStream> {
        if self.refuse_open {
            return Err(Error::Rpc(Status::unavailable("backend is down")));
        }
        self.opened.lock().unwrap().push(profile.id.clone());

        let state = (
            self.queue(&profile.id),
            self.pulled.clone(),
            SessionGuard {
                closed: self.closed.clone(),
            },
        );
        let items = stream::unfold(state, |(queue, pulled, guard)| async move {
            let next = queue.lock().unwrap().pop_front()?;
            pulled.fetch_add(1, Ordering::SeqCst);
            Some((next, (queue, pulled, guard)))
        });
        Ok(Box::pin(items))
    }

    async fn create_assignments(&self, assignments: Assignments) -> Result<proto::Result> {
        self.assignments.lock().unwrap().push(assignments);
        if self.fail_assignments {
            return Err(Error::Rpc(Status::internal("assignment store unavailable")));
        }
        Ok(proto::Result {
            success: true,
            error: String::new(),
        })
    }

    async fn delete_match(&self, m: MatchObject) -> Result<proto::Result> {
        self.deleted.lock().unwrap().push(m);
        if self.fail_deletes {
            return Err(Error::Rpc(Status::internal("delete failed")));
        }
        Ok(proto::Result {
            success: true,
            error: String::new(),
        })
    }
}

/// How [`FakeAllocator::allocate`] behaves.
#[derive(Debug, Clone, Copy)]
pub enum AllocMode {
    Succeed,
    NoCapacity,
    /// Fails until this much time has passed since the allocator was built.
    FailFor(Duration),
}

/// Records every call; hands out `10.0.0.1:<7000 + n>` connection strings.
pub struct FakeAllocator {
    pub mode: AllocMode,
    pub created: Instant,
    pub next_port: AtomicUsize,
    pub attempts: Mutex<Vec<(String, Duration)>>,
    pub allocated: Mutex<Vec<(String, String)>>,
    pub released: Mutex<Vec<String>>,
    pub fail_unallocate: bool,
}

impl FakeAllocator {
    pub fn new(mode: AllocMode) -> Self {
        Self {
            mode,
            created: Instant::now(),
            next_port: AtomicUsize::new(0),
            attempts: Mutex::new(Vec::new()),
            allocated: Mutex::new(Vec::new()),
            released: Mutex::new(Vec::new()),
            fail_unallocate: false,
        }
    }

    pub fn attempted_ids(&self) -> Vec<String> {
        self.attempts.lock().unwrap().iter().map(|(id, _)| id.clone()).collect()
    }
}

#[tonic::async_trait]
impl Allocator for FakeAllocator {
    async fn allocate(&self, m: &MatchObject) -> Result<ConnectionHandle> {
        let elapsed = self.created.elapsed();
        self.attempts.lock().unwrap().push((m.id.clone(), elapsed));

        let available = match self.mode {
            AllocMode::Succeed => true,
            AllocMode::NoCapacity => false,
            AllocMode::FailFor(window) => elapsed >= window,
        };
        if !available {
            return Err(Error::NoCapacity);
        }

        let port = 7000 + self.next_port.fetch_add(1, Ordering::SeqCst);
        let connection = format!("10.0.0.1:{port}");
        self.allocated
            .lock()
            .unwrap()
            .push((m.id.clone(), connection.clone()));
        Ok(ConnectionHandle::new(connection))
    }

    async fn unallocate(&self, handle: ConnectionHandle) -> Result<()> {
        self.released.lock().unwrap().push(handle.to_string());
        if self.fail_unallocate {
            return Err(Error::Unallocation {
                reason: format!("found no game servers matching {handle}"),
            });
        }
        Ok(())
    }
}
