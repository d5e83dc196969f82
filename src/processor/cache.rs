/*!
 * Process Info Cache
 * Bounded LRU cache over the OS process table
 *
 * Enrichment is best-effort: a failed lookup is cached as unresolved so
 * a dead pid does not hammer the process table, and refreshed once its
 * TTL expires like any other entry.
 */

use crate::core::types::{Pid, TimestampSecs};
use serde::Serialize;
use std::collections::HashMap;

/// Fields pulled from the OS process table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProcess {
    pub comm: String,
    pub cmdline: String,
    pub user: String,
}

/// Seam to the OS process table. The production implementation reads it
/// through sysinfo; tests substitute counting fakes.
pub trait ProcessResolver: Send + Sync {
    fn resolve(&self, pid: Pid) -> Option<ResolvedProcess>;
}

/// Cached per-pid context attached to enriched events
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessInfo {
    pub comm: String,
    pub cmdline: String,
    pub user: String,
    pub resolved: bool,
    pub first_seen: TimestampSecs,
    pub last_seen: TimestampSecs,
}

struct CacheEntry {
    info: ProcessInfo,
    refreshed_at: TimestampSecs,
    last_used: u64,
}

/// LRU + TTL cache, owned by the stream processor.
pub struct ProcessCache {
    capacity: usize,
    ttl: f64,
    tick: u64,
    resolver_calls: u64,
    entries: HashMap<Pid, CacheEntry>,
}

impl ProcessCache {
    pub fn new(capacity: usize, ttl: f64) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            tick: 0,
            resolver_calls: 0,
            entries: HashMap::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Times the backing resolver was consulted
    #[inline]
    pub fn resolver_calls(&self) -> u64 {
        self.resolver_calls
    }

    /// Fetch the entry for `pid`, consulting the resolver only when the
    /// pid is absent or its entry is older than the TTL.
    pub fn lookup(
        &mut self,
        pid: Pid,
        now: TimestampSecs,
        resolver: &dyn ProcessResolver,
    ) -> ProcessInfo {
        self.tick += 1;

        if let Some(entry) = self.entries.get_mut(&pid) {
            if now - entry.refreshed_at <= self.ttl {
                entry.last_used = self.tick;
                entry.info.last_seen = now;
                return entry.info.clone();
            }
        }

        // Absent or stale: hit the process table
        self.resolver_calls += 1;
        let first_seen = self
            .entries
            .get(&pid)
            .map(|e| e.info.first_seen)
            .unwrap_or(now);

        let info = match resolver.resolve(pid) {
            Some(resolved) => ProcessInfo {
                comm: resolved.comm,
                cmdline: resolved.cmdline,
                user: resolved.user,
                resolved: true,
                first_seen,
                last_seen: now,
            },
            None => ProcessInfo {
                comm: String::new(),
                cmdline: String::new(),
                user: String::new(),
                resolved: false,
                first_seen,
                last_seen: now,
            },
        };

        if !self.entries.contains_key(&pid) && self.entries.len() >= self.capacity {
            self.evict_lru();
        }
        self.entries.insert(
            pid,
            CacheEntry {
                info: info.clone(),
                refreshed_at: now,
                last_used: self.tick,
            },
        );
        info
    }

    fn evict_lru(&mut self) {
        if let Some((&victim, _)) = self.entries.iter().min_by_key(|(_, e)| e.last_used) {
            self.entries.remove(&victim);
        }
    }
}

/// Production resolver backed by sysinfo.
pub struct SysinfoResolver {
    sys: parking_lot::Mutex<sysinfo::System>,
    users: sysinfo::Users,
}

impl SysinfoResolver {
    pub fn new() -> Self {
        Self {
            sys: parking_lot::Mutex::new(sysinfo::System::new()),
            users: sysinfo::Users::new_with_refreshed_list(),
        }
    }
}

impl Default for SysinfoResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessResolver for SysinfoResolver {
    fn resolve(&self, pid: Pid) -> Option<ResolvedProcess> {
        let sys_pid = sysinfo::Pid::from_u32(pid);
        let mut sys = self.sys.lock();
        if !sys.refresh_process(sys_pid) {
            return None;
        }
        let process = sys.process(sys_pid)?;
        let user = process
            .user_id()
            .and_then(|uid| self.users.get_user_by_id(uid))
            .map(|u| u.name().to_string())
            .unwrap_or_default();
        Some(ResolvedProcess {
            comm: process.name().to_string(),
            cmdline: process.cmd().join(" "),
            user,
        })
    }
}
