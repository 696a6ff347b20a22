use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use anyhow::{Result, bail};
use once_cell::sync::OnceCell;

use super::specialization::{CachedNode, GuardOutcome, specialize};
use super::stats::{CacheState, CallSiteStats, SiteCounters, bump};
use super::{DispatchAction, DispatchPolicy, SpecializationKind, dispatch_uncached};
use crate::config::MAX_CACHE_LIMIT;
use crate::rt::DispatchRuntime;
use crate::val::{Block, Symbol, Value};

// Head sentinels. Any other value is the arena index of the newest link.
const UNRESOLVED: usize = usize::MAX;
const UNCACHED: usize = usize::MAX - 1;

/// Inline cache for one static call expression.
///
/// Links live in a fixed arena of write-once slots. A link is fully built in
/// its slot before the head index pointing at it is published with a release
/// store, so a reader that acquires the head sees every link reachable from it.
/// Only extension takes `extend_lock`, and no lookup or method body runs while
/// it is held.
pub struct CallSite {
    runtime: DispatchRuntime,
    name: Symbol,
    policy: DispatchPolicy,
    nodes: Box<[OnceCell<CachedNode>]>,
    head: AtomicUsize,
    depth: AtomicUsize,
    extend_lock: Mutex<()>,
    counters: SiteCounters,
}

impl CallSite {
    pub fn new(runtime: DispatchRuntime, name: Symbol, policy: DispatchPolicy) -> Self {
        // Options built in code skip validation.
        let limit = runtime.options().cache_limit.min(MAX_CACHE_LIMIT);
        let nodes = (0..limit).map(|_| OnceCell::new()).collect();
        Self {
            runtime,
            name,
            policy,
            nodes,
            head: AtomicUsize::new(UNRESOLVED),
            depth: AtomicUsize::new(0),
            extend_lock: Mutex::new(()),
            counters: SiteCounters::default(),
        }
    }

    #[inline]
    pub fn name(&self) -> Symbol {
        self.name
    }

    #[inline]
    pub fn policy(&self) -> DispatchPolicy {
        self.policy
    }

    #[inline]
    pub fn runtime(&self) -> &DispatchRuntime {
        &self.runtime
    }

    /// Number of links published so far. Never shrinks.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    pub fn state(&self) -> CacheState {
        match self.head.load(Ordering::Acquire) {
            UNRESOLVED => CacheState::Unresolved,
            UNCACHED => CacheState::Megamorphic,
            _ if self.depth() == 1 => CacheState::Monomorphic,
            _ => CacheState::Polymorphic,
        }
    }

    pub fn stats(&self) -> CallSiteStats {
        self.counters.snapshot(self.state(), self.depth())
    }

    /// Kinds of the published links, newest first. Empty once megamorphic.
    pub fn chain_kinds(&self) -> Vec<SpecializationKind> {
        let mut kinds = Vec::new();
        let mut cursor = self.first_link(self.head.load(Ordering::Acquire));
        while let Some(node) = cursor.and_then(|index| self.node(index)) {
            kinds.push(node.kind());
            cursor = node.next();
        }
        kinds
    }

    /// Dispatch through the cache. For respond-to sites the result is a `Bool`.
    pub fn call(&self, receiver: &Value, args: &[Value], block: Option<&Block>) -> Result<Value> {
        if receiver.is_missing() {
            bail!("cannot dispatch `{}' on the missing sentinel", self.name);
        }
        bump(&self.counters.calls);

        let head = self.head.load(Ordering::Acquire);
        if head == UNCACHED {
            return self.uncached(receiver, args, block);
        }
        if let Some(node) = self.find(head, receiver) {
            bump(&self.counters.hits);
            return node.execute(&self.runtime, self.policy.action, receiver, args, block);
        }
        self.extend(receiver, args, block)
    }

    pub fn respond_to(&self, receiver: &Value) -> Result<bool> {
        if self.policy.action != DispatchAction::RespondTo {
            bail!("`{}' is not a respond-to call site", self.name);
        }
        Ok(matches!(self.call(receiver, &[], None)?, Value::Bool(true)))
    }

    #[inline]
    fn first_link(&self, head: usize) -> Option<usize> {
        (head != UNRESOLVED && head != UNCACHED).then_some(head)
    }

    #[inline]
    fn node(&self, index: usize) -> Option<&CachedNode> {
        self.nodes.get(index).and_then(OnceCell::get)
    }

    fn find(&self, head: usize, receiver: &Value) -> Option<&CachedNode> {
        let lookup = self.runtime.lookup();
        let mut cursor = self.first_link(head);
        while let Some(node) = cursor.and_then(|index| self.node(index)) {
            match node.guard(self.name, receiver, lookup) {
                GuardOutcome::Hit => return Some(node),
                GuardOutcome::Stale => {
                    bump(&self.counters.stale_skips);
                    tracing::trace!(target: "lkr::dispatch::race", name = %self.name, kind = ?node.kind(), "skipping stale link");
                }
                GuardOutcome::Miss => {}
            }
            cursor = node.next();
        }
        None
    }

    fn uncached(&self, receiver: &Value, args: &[Value], block: Option<&Block>) -> Result<Value> {
        bump(&self.counters.uncached_calls);
        dispatch_uncached(&self.runtime, self.policy, receiver, self.name, args, block)
    }

    fn extend(&self, receiver: &Value, args: &[Value], block: Option<&Block>) -> Result<Value> {
        // Lookup runs unlocked; a site that is already full skips it.
        let candidate = if self.depth() < self.nodes.len() {
            Some(specialize(&self.runtime, self.policy, receiver, self.name, args)?)
        } else {
            None
        };

        let guard = self.extend_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let head = self.head.load(Ordering::Acquire);
        if head == UNCACHED {
            drop(guard);
            return self.uncached(receiver, args, block);
        }
        if let Some(winner) = self.find(head, receiver) {
            drop(guard);
            bump(&self.counters.races);
            tracing::trace!(target: "lkr::dispatch::race", name = %self.name, "lost extension race");
            return winner.execute(&self.runtime, self.policy.action, receiver, args, block);
        }

        let depth = self.depth.load(Ordering::Relaxed);
        let Some(candidate) = candidate.filter(|_| depth < self.nodes.len()) else {
            self.head.store(UNCACHED, Ordering::Release);
            drop(guard);
            tracing::debug!(target: "lkr::dispatch::megamorphic", name = %self.name, depth, "call site is megamorphic");
            return self.uncached(receiver, args, block);
        };

        let kind = candidate.kind();
        let link = candidate.link(self.first_link(head));
        if self.nodes[depth].set(link).is_err() {
            bail!("call site `{}' reused arena slot {depth}", self.name);
        }
        self.depth.store(depth + 1, Ordering::Release);
        self.head.store(depth, Ordering::Release);
        drop(guard);

        bump(&self.counters.extensions);
        tracing::debug!(target: "lkr::dispatch::rewrite", name = %self.name, ?kind, depth = depth + 1, "extended call site");

        // The fresh link can already be stale, or may not cover this receiver
        // if a redefinition raced the lookups. The slow path is always correct.
        match self.node(depth) {
            Some(node) if node.guard(self.name, receiver, self.runtime.lookup()) == GuardOutcome::Hit => {
                node.execute(&self.runtime, self.policy.action, receiver, args, block)
            }
            _ => dispatch_uncached(&self.runtime, self.policy, receiver, self.name, args, block),
        }
    }
}

impl fmt::Debug for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallSite")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("state", &self.state())
            .field("depth", &self.depth())
            .finish_non_exhaustive()
    }
}
