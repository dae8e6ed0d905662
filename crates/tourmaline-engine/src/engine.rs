//! The restriction engine.
//!
//! Owns the compiled static policy and the stateful resource index,
//! answers per-request restriction questions, and rebuilds the index on a
//! dedicated background thread when the topology changes.
//!
//! # Concurrency
//!
//! Evaluation reads each compiled structure through one atomic handle
//! load and never blocks on I/O or rebuilds. Rebuilds run on the worker
//! thread, build a whole new index, and install it with a single pointer
//! swap; a rebuild that went stale mid-flight (a newer topology version
//! arrived) loops to re-process the latest version instead of queueing
//! one rebuild per change. In-flight evaluations keep whatever snapshot
//! they loaded; they are never torn between old and new structures.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex, PoisonError, RwLock};
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use tourmaline_rules::{Restriction, RestrictionRule};
use tourmaline_types::{Identity, ResourceRef, ResourceScope, Topology};

use crate::compiler::StaticPolicy;
use crate::error::Result;
use crate::index::ResourceIndex;
use crate::pattern::Pattern;
use crate::roles::RoleDefinition;

/// Stale-rebuild iterations tolerated before the worker briefly yields.
const MAX_CONSECUTIVE_REBUILDS: u32 = 8;
const REBUILD_BACKOFF: Duration = Duration::from_millis(10);

fn read_arc<T>(slot: &RwLock<Arc<T>>) -> Arc<T> {
    Arc::clone(&slot.read().unwrap_or_else(PoisonError::into_inner))
}

fn store_arc<T>(slot: &RwLock<Arc<T>>, value: Arc<T>) {
    *slot.write().unwrap_or_else(PoisonError::into_inner) = value;
}

struct EngineShared<R> {
    policy: RwLock<Arc<StaticPolicy<R>>>,
    index: RwLock<Arc<ResourceIndex<R>>>,
    roles: RwLock<Arc<Vec<RoleDefinition<R>>>>,
    topology: RwLock<Arc<Topology>>,
    /// Latest topology version awaiting (or holding) an index.
    pending_version: AtomicU64,
    /// Serializes rebuild against rebuild, never against readers.
    rebuild_gate: Mutex<()>,
    shutdown: AtomicBool,
}

impl<R: RestrictionRule> EngineShared<R> {
    /// Rebuilds the index until the version it processed is still the
    /// latest, coalescing bursts of topology changes into few rebuilds.
    fn rebuild_to_latest(&self) {
        let _gate = self.rebuild_gate.lock().unwrap_or_else(PoisonError::into_inner);
        let mut consecutive = 0u32;
        loop {
            let target = self.pending_version.load(Ordering::Acquire);
            let started = std::time::Instant::now();
            let roles = read_arc(&self.roles);
            let topology = read_arc(&self.topology);
            let rebuilt = Arc::new(ResourceIndex::build(&roles, &topology));
            let version = rebuilt.version();
            store_arc(&self.index, rebuilt);
            info!(
                version,
                elapsed_us = started.elapsed().as_micros() as u64,
                "resource index installed"
            );

            if self.pending_version.load(Ordering::Acquire) == target {
                break;
            }
            consecutive += 1;
            if consecutive >= MAX_CONSECUTIVE_REBUILDS {
                // Rapid flapping; yield so other background work runs.
                thread::sleep(REBUILD_BACKOFF);
                consecutive = 0;
            }
        }
    }
}

fn worker_loop<R: RestrictionRule>(shared: &EngineShared<R>, nudges: &mpsc::Receiver<()>) {
    while nudges.recv().is_ok() {
        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }
        shared.rebuild_to_latest();
    }
    debug!("index rebuild worker stopped");
}

/// The role-based restriction engine, generic over the rule kind.
///
/// Hosts typically run three engines side by side, one per rule kind
/// (document filters, field allows, field masking), fed from the same
/// role configuration and topology events.
pub struct RestrictionEngine<R: RestrictionRule> {
    shared: Arc<EngineShared<R>>,
    nudge: mpsc::Sender<()>,
    worker: Option<thread::JoinHandle<()>>,
}

impl<R: RestrictionRule> RestrictionEngine<R> {
    /// Compiles the role set, builds the first index synchronously, and
    /// starts the rebuild worker.
    pub fn new(roles: Vec<RoleDefinition<R>>, topology: Topology) -> Self {
        let policy = Arc::new(StaticPolicy::compile(&roles));
        let index = Arc::new(ResourceIndex::build(&roles, &topology));
        let shared = Arc::new(EngineShared {
            policy: RwLock::new(policy),
            index: RwLock::new(index),
            roles: RwLock::new(Arc::new(roles)),
            pending_version: AtomicU64::new(topology.version()),
            topology: RwLock::new(Arc::new(topology)),
            rebuild_gate: Mutex::new(()),
            shutdown: AtomicBool::new(false),
        });

        let (nudge, nudges) = mpsc::channel();
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("tourmaline-index".to_string())
            .spawn(move || worker_loop(&worker_shared, &nudges))
            .expect("failed to spawn index rebuild thread");

        Self {
            shared,
            nudge,
            worker: Some(worker),
        }
    }

    /// Installs a new topology snapshot and schedules an index rebuild.
    ///
    /// Returns immediately; evaluations keep using the previous index
    /// until the rebuilt one is installed.
    pub fn on_topology_changed(&self, topology: Topology) {
        let version = topology.version();
        store_arc(&self.shared.topology, Arc::new(topology));
        self.shared
            .pending_version
            .store(version, Ordering::Release);
        let _ = self.nudge.send(());
        debug!(version, "topology change scheduled for index rebuild");
    }

    /// Recompiles the static policy for a new role set and schedules an
    /// index rebuild against the current topology.
    ///
    /// The new policy takes effect immediately; the index catches up
    /// asynchronously.
    pub fn on_role_config_changed(&self, roles: Vec<RoleDefinition<R>>) {
        let policy = Arc::new(StaticPolicy::compile(&roles));
        info!(
            roles = roles.len(),
            skipped = policy.init_errors().len(),
            "role configuration recompiled"
        );
        store_arc(&self.shared.policy, policy);
        store_arc(&self.shared.roles, Arc::new(roles));
        let _ = self.nudge.send(());
    }

    /// Computes the restriction for one (identity, resource) pair.
    pub fn evaluate(&self, identity: &Identity, resource: &str) -> Result<Restriction<R>> {
        let policy = read_arc(&self.shared.policy);
        let index = read_arc(&self.shared.index);
        let topology = read_arc(&self.shared.topology);
        match evaluate_outcome(&policy, &index, &topology, identity, resource)? {
            Outcome::Unrestricted => Ok(Restriction::Unrestricted),
            Outcome::Denied => Ok(Restriction::FullyRestricted),
            Outcome::Rules(rules) => {
                let merged = R::merge(rules);
                if merged.is_unrestricted() {
                    Ok(Restriction::Unrestricted)
                } else {
                    Ok(Restriction::Rule(merged))
                }
            }
        }
    }

    /// Computes restrictions for a batch of resources against one
    /// snapshot, short-circuiting when a role is unrestricted everywhere.
    pub fn evaluate_many<I, S>(
        &self,
        identity: &Identity,
        resources: I,
    ) -> Result<BTreeMap<String, Restriction<R>>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let policy = read_arc(&self.shared.policy);
        let index = read_arc(&self.shared.index);
        let topology = read_arc(&self.shared.topology);

        let globally_unrestricted = identity.roles().any(|role| {
            ResourceScope::ALL
                .iter()
                .all(|&scope| policy.scope(scope).is_wildcard_unrestricted(role))
        });

        let mut results = BTreeMap::new();
        for resource in resources {
            let resource = resource.into();
            let restriction = if globally_unrestricted {
                Restriction::Unrestricted
            } else {
                match evaluate_outcome(&policy, &index, &topology, identity, &resource)? {
                    Outcome::Unrestricted => Restriction::Unrestricted,
                    Outcome::Denied => Restriction::FullyRestricted,
                    Outcome::Rules(rules) => {
                        let merged = R::merge(rules);
                        if merged.is_unrestricted() {
                            Restriction::Unrestricted
                        } else {
                            Restriction::Rule(merged)
                        }
                    }
                }
            };
            results.insert(resource, restriction);
        }
        Ok(results)
    }

    /// Whether any restriction applies at all. Cheaper than
    /// [`evaluate`](Self::evaluate): collected rules are not merged.
    pub fn has_restriction(&self, identity: &Identity, resource: &str) -> Result<bool> {
        let policy = read_arc(&self.shared.policy);
        let index = read_arc(&self.shared.index);
        let topology = read_arc(&self.shared.topology);
        match evaluate_outcome(&policy, &index, &topology, identity, resource)? {
            Outcome::Unrestricted => Ok(false),
            Outcome::Denied => Ok(true),
            // Every rule kind merges to unrestricted exactly when some
            // contributor is the unrestricted degenerate.
            Outcome::Rules(rules) => Ok(!rules.iter().any(RestrictionRule::is_unrestricted)),
        }
    }

    /// The topology version the installed index was built against.
    pub fn index_version(&self) -> u64 {
        read_arc(&self.shared.index).version()
    }

    /// The version of the topology snapshot evaluations currently see.
    pub fn topology_version(&self) -> u64 {
        read_arc(&self.shared.topology).version()
    }

    /// Roles skipped at the last policy compile, with the reason.
    ///
    /// Non-empty output is a configuration-health signal; affected roles
    /// grant nothing until fixed.
    pub fn role_init_errors(&self) -> BTreeMap<String, String> {
        read_arc(&self.shared.policy).init_errors().clone()
    }
}

impl<R: RestrictionRule> Drop for RestrictionEngine<R> {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        let _ = self.nudge.send(());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

enum Outcome<R> {
    Unrestricted,
    Rules(Vec<R>),
    Denied,
}

/// Per-request evaluation state: the accumulated rule set and the
/// (role, pattern) render memo, so templates render at most once per
/// request no matter how many hierarchy levels consult them.
struct EvalCtx<'a, R: RestrictionRule> {
    policy: &'a StaticPolicy<R>,
    index: &'a ResourceIndex<R>,
    identity: &'a Identity,
    rendered: HashMap<(&'a str, &'a Pattern), Pattern>,
    rules: Vec<R>,
}

impl<'a, R: RestrictionRule> EvalCtx<'a, R> {
    fn new(
        policy: &'a StaticPolicy<R>,
        index: &'a ResourceIndex<R>,
        identity: &'a Identity,
    ) -> Self {
        Self {
            policy,
            index,
            identity,
            rendered: HashMap::new(),
            rules: Vec::new(),
        }
    }

    /// Checks one hierarchy level. `Ok(true)` means a no-rule grant
    /// matched and evaluation short-circuits to Unrestricted.
    fn level(&mut self, scope: ResourceScope, name: &str) -> Result<bool> {
        let identity = self.identity;
        let index = self.index;
        let tables = self.policy.scope(scope);

        if identity.roles().any(|r| tables.is_wildcard_unrestricted(r)) {
            return Ok(true);
        }
        if let Some(granted) = index.roles_without_rule(scope, name) {
            if identity.roles().any(|r| granted.contains(r)) {
                return Ok(true);
            }
        }
        for role in identity.roles() {
            if let Some(rule) = tables.wildcard_rule(role) {
                self.rules.push(rule.clone());
            }
            if let Some(rule) = index.rule_for(scope, name, role) {
                self.rules.push(rule.clone());
            }
            for pattern in tables.templated_unrestricted(role) {
                if self.render_matches(role, pattern, name)? {
                    return Ok(true);
                }
            }
            for (pattern, rule) in tables.templated_rules(role) {
                if self.render_matches(role, pattern, name)? {
                    self.rules.push(rule.clone());
                }
            }
        }
        Ok(false)
    }

    // The memo key is the whole pattern, not its raw text: two entries of
    // one role can share raw text while differing in exclusion, and the
    // first render must not donate its exclusion to the other.
    fn render_matches(&mut self, role: &'a str, pattern: &'a Pattern, name: &str) -> Result<bool> {
        let rendered = match self.rendered.entry((role, pattern)) {
            Entry::Occupied(slot) => slot.into_mut(),
            Entry::Vacant(slot) => slot.insert(pattern.render(self.identity)?),
        };
        Ok(rendered.matches(name))
    }
}

fn evaluate_outcome<R: RestrictionRule>(
    policy: &StaticPolicy<R>,
    index: &ResourceIndex<R>,
    topology: &Topology,
    identity: &Identity,
    name: &str,
) -> Result<Outcome<R>> {
    // An identity without roles is restricted everywhere.
    if !identity.has_roles() {
        return Ok(Outcome::Denied);
    }

    let target = topology.lookup(name);
    let scope = match target {
        ResourceRef::Resource(_) | ResourceRef::Missing => ResourceScope::Resource,
        ResourceRef::Group(_) => ResourceScope::Group,
        ResourceRef::Sequence(_) => ResourceScope::Sequence,
    };

    // The global everything-grant short-circuits before the existence
    // check: a role unrestricted on the whole kind does not care whether
    // this particular name resolves.
    if identity
        .roles()
        .any(|r| policy.scope(scope).is_wildcard_unrestricted(r))
    {
        return Ok(Outcome::Unrestricted);
    }

    // Unknown or absent targets fail closed.
    let present = match target {
        ResourceRef::Missing => false,
        ResourceRef::Resource(resource) => resource.exists(),
        ResourceRef::Group(_) | ResourceRef::Sequence(_) => true,
    };
    if !present {
        debug!(resource = name, "unknown or absent target; fully restricted");
        return Ok(Outcome::Denied);
    }

    let mut ctx = EvalCtx::new(policy, index, identity);
    match target {
        ResourceRef::Resource(_) => {
            if ctx.level(ResourceScope::Resource, name)? {
                return Ok(Outcome::Unrestricted);
            }
            // Access through a containing group or sequence is as good as
            // direct access.
            for group in topology.parent_groups_of(name) {
                if ctx.level(ResourceScope::Group, group.name())? {
                    return Ok(Outcome::Unrestricted);
                }
            }
            if let Some(sequence) = topology.parent_sequence_of(name) {
                if ctx.level(ResourceScope::Sequence, sequence.name())? {
                    return Ok(Outcome::Unrestricted);
                }
                for group in topology.parent_groups_of(sequence.name()) {
                    if ctx.level(ResourceScope::Group, group.name())? {
                        return Ok(Outcome::Unrestricted);
                    }
                }
            }
        }
        ResourceRef::Group(_) => {
            if ctx.level(ResourceScope::Group, name)? {
                return Ok(Outcome::Unrestricted);
            }
            for group in topology.parent_groups_of(name) {
                if ctx.level(ResourceScope::Group, group.name())? {
                    return Ok(Outcome::Unrestricted);
                }
            }
        }
        ResourceRef::Sequence(_) => {
            if ctx.level(ResourceScope::Sequence, name)? {
                return Ok(Outcome::Unrestricted);
            }
            for group in topology.parent_groups_of(name) {
                if ctx.level(ResourceScope::Group, group.name())? {
                    return Ok(Outcome::Unrestricted);
                }
            }
        }
        ResourceRef::Missing => unreachable!("missing targets were denied above"),
    }

    if ctx.rules.is_empty() {
        // No matching role produced any rule: safe-by-default denial.
        debug!(resource = name, "no matching grants; fully restricted");
        Ok(Outcome::Denied)
    } else {
        Ok(Outcome::Rules(ctx.rules))
    }
}
