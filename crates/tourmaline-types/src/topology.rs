//! Resource topology snapshots.
//!
//! The topology describes which concrete resources currently exist: leaf
//! resources, named groups whose membership is resolved dynamically, and
//! ordered sequences of resource generations. Snapshots are immutable and
//! carry a monotonic version; topology changes always produce a whole new
//! snapshot.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// The three partitions a pattern or index entry can target.
///
/// Every role access entry, compiled policy table, and index table is
/// scoped to exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceScope {
    /// A leaf data partition (table/index).
    Resource,
    /// A named, dynamically-resolved set of resources.
    Group,
    /// An ordered collection of resource generations.
    Sequence,
}

impl ResourceScope {
    /// All scopes, in hierarchy order (leaf first).
    pub const ALL: [ResourceScope; 3] = [
        ResourceScope::Resource,
        ResourceScope::Group,
        ResourceScope::Sequence,
    ];
}

impl std::fmt::Display for ResourceScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceScope::Resource => write!(f, "resource"),
            ResourceScope::Group => write!(f, "group"),
            ResourceScope::Sequence => write!(f, "sequence"),
        }
    }
}

/// A leaf resource.
///
/// A resource that is referenced but not (or no longer) physically present
/// is kept in the topology with `exists == false`. Evaluation treats such
/// resources as fully restricted; they are first-class values, never
/// `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    name: String,
    exists: bool,
}

impl Resource {
    /// Creates a present resource with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exists: true,
        }
    }

    /// Marks this resource as referenced-but-absent.
    pub fn absent(mut self) -> Self {
        self.exists = false;
        self
    }

    /// The resource name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the resource physically exists.
    pub fn exists(&self) -> bool {
        self.exists
    }
}

/// A named set of member resources and sequences.
///
/// Membership is stored by name and resolved against the owning snapshot,
/// so a group never holds stale links to resources that were replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGroup {
    name: String,
    members: BTreeSet<String>,
}

impl ResourceGroup {
    /// Creates an empty group.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: BTreeSet::new(),
        }
    }

    /// Adds a member resource or sequence by name.
    pub fn with_member(mut self, member: impl Into<String>) -> Self {
        self.members.insert(member.into());
        self
    }

    /// The group name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Member names (resources and sequences).
    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(String::as_str)
    }

    /// Whether the named resource or sequence is a member.
    pub fn contains(&self, name: &str) -> bool {
        self.members.contains(name)
    }
}

/// An ordered collection of resource generations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSequence {
    name: String,
    generations: Vec<String>,
}

impl ResourceSequence {
    /// Creates an empty sequence.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            generations: Vec::new(),
        }
    }

    /// Appends a generation resource by name (oldest first).
    pub fn with_generation(mut self, generation: impl Into<String>) -> Self {
        self.generations.push(generation.into());
        self
    }

    /// The sequence name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Generation resource names, oldest first.
    pub fn generations(&self) -> impl Iterator<Item = &str> {
        self.generations.iter().map(String::as_str)
    }

    /// Whether the named resource is a generation of this sequence.
    pub fn contains(&self, name: &str) -> bool {
        self.generations.iter().any(|g| g == name)
    }
}

/// Result of looking up a name in a [`Topology`].
///
/// `Missing` is a first-class outcome: evaluation against an unknown name
/// must fail closed, so lookups never collapse "unknown" into an `Option`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceRef<'a> {
    /// The name denotes a leaf resource.
    Resource(&'a Resource),
    /// The name denotes a group.
    Group(&'a ResourceGroup),
    /// The name denotes a sequence.
    Sequence(&'a ResourceSequence),
    /// The name is not present in this snapshot.
    Missing,
}

/// An immutable topology snapshot.
///
/// # Thread safety
///
/// `Topology` is shared behind `Arc` across evaluation threads. It is
/// never mutated after construction; a topology change installs a new
/// snapshot with a higher version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    version: u64,
    resources: BTreeMap<String, Resource>,
    groups: BTreeMap<String, ResourceGroup>,
    sequences: BTreeMap<String, ResourceSequence>,
}

impl Topology {
    /// Creates an empty snapshot with the given version.
    pub fn new(version: u64) -> Self {
        Self {
            version,
            resources: BTreeMap::new(),
            groups: BTreeMap::new(),
            sequences: BTreeMap::new(),
        }
    }

    /// Adds a leaf resource.
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resources.insert(resource.name.clone(), resource);
        self
    }

    /// Adds a group.
    pub fn with_group(mut self, group: ResourceGroup) -> Self {
        self.groups.insert(group.name.clone(), group);
        self
    }

    /// Adds a sequence.
    pub fn with_sequence(mut self, sequence: ResourceSequence) -> Self {
        self.sequences.insert(sequence.name.clone(), sequence);
        self
    }

    /// The monotonic snapshot version.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Looks up a name across all three collections.
    ///
    /// Resources shadow groups and sequences if a name is (incorrectly)
    /// reused across collections; topologies are expected to keep names
    /// unique.
    pub fn lookup(&self, name: &str) -> ResourceRef<'_> {
        if let Some(r) = self.resources.get(name) {
            return ResourceRef::Resource(r);
        }
        if let Some(g) = self.groups.get(name) {
            return ResourceRef::Group(g);
        }
        if let Some(s) = self.sequences.get(name) {
            return ResourceRef::Sequence(s);
        }
        ResourceRef::Missing
    }

    /// The scope a name belongs to, if it is present at all.
    pub fn scope_of(&self, name: &str) -> Option<ResourceScope> {
        match self.lookup(name) {
            ResourceRef::Resource(_) => Some(ResourceScope::Resource),
            ResourceRef::Group(_) => Some(ResourceScope::Group),
            ResourceRef::Sequence(_) => Some(ResourceScope::Sequence),
            ResourceRef::Missing => None,
        }
    }

    /// Looks up a leaf resource by name.
    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources.get(name)
    }

    /// Looks up a group by name.
    pub fn group(&self, name: &str) -> Option<&ResourceGroup> {
        self.groups.get(name)
    }

    /// Looks up a sequence by name.
    pub fn sequence(&self, name: &str) -> Option<&ResourceSequence> {
        self.sequences.get(name)
    }

    /// All leaf resources.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    /// All groups.
    pub fn groups(&self) -> impl Iterator<Item = &ResourceGroup> {
        self.groups.values()
    }

    /// All sequences.
    pub fn sequences(&self) -> impl Iterator<Item = &ResourceSequence> {
        self.sequences.values()
    }

    /// All names of the given scope.
    pub fn names_of(&self, scope: ResourceScope) -> impl Iterator<Item = &str> {
        let (r, g, s) = match scope {
            ResourceScope::Resource => (Some(&self.resources), None, None),
            ResourceScope::Group => (None, Some(&self.groups), None),
            ResourceScope::Sequence => (None, None, Some(&self.sequences)),
        };
        r.into_iter()
            .flat_map(BTreeMap::keys)
            .chain(g.into_iter().flat_map(BTreeMap::keys))
            .chain(s.into_iter().flat_map(BTreeMap::keys))
            .map(String::as_str)
    }

    /// Leaf resources that are not owned by any group or sequence.
    ///
    /// Aggregate listings that already account for a parent must not count
    /// its members again; this iterator skips every leaf reachable through
    /// a group or sequence.
    pub fn bare_resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources
            .values()
            .filter(|r| self.parent_groups_of(r.name()).is_empty())
            .filter(|r| self.parent_sequence_of(r.name()).is_none())
    }

    /// Groups that directly contain the named resource or sequence.
    ///
    /// Resolved against this snapshot on every call; groups do not store
    /// reverse links.
    pub fn parent_groups_of(&self, name: &str) -> Vec<&ResourceGroup> {
        self.groups.values().filter(|g| g.contains(name)).collect()
    }

    /// The sequence the named resource is a generation of, if any.
    ///
    /// A resource belongs to at most one sequence; the first match wins if
    /// a malformed topology violates that.
    pub fn parent_sequence_of(&self, name: &str) -> Option<&ResourceSequence> {
        self.sequences.values().find(|s| s.contains(name))
    }

    /// Leaf resources directly reachable through the named group.
    ///
    /// Member sequences are not flattened into their generations here;
    /// sequence generations are reached through the sequence itself.
    pub fn group_leaves(&self, group: &str) -> Vec<&Resource> {
        let Some(group) = self.groups.get(group) else {
            return Vec::new();
        };
        group
            .members()
            .filter_map(|m| self.resources.get(m))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_topology() -> Topology {
        Topology::new(7)
            .with_resource(Resource::new("logs-2024"))
            .with_resource(Resource::new("logs-2025"))
            .with_resource(Resource::new("metrics-2024"))
            .with_resource(Resource::new("gone").absent())
            .with_group(
                ResourceGroup::new("logs")
                    .with_member("logs-2024")
                    .with_member("logs-2025"),
            )
            .with_sequence(
                ResourceSequence::new("metrics")
                    .with_generation("metrics-2024"),
            )
    }

    #[test]
    fn test_lookup_by_scope() {
        let topo = sample_topology();

        assert!(matches!(topo.lookup("logs-2024"), ResourceRef::Resource(_)));
        assert!(matches!(topo.lookup("logs"), ResourceRef::Group(_)));
        assert!(matches!(topo.lookup("metrics"), ResourceRef::Sequence(_)));
        assert!(matches!(topo.lookup("nope"), ResourceRef::Missing));
    }

    #[test]
    fn test_absent_resource_is_first_class() {
        let topo = sample_topology();

        let gone = topo.resource("gone").unwrap();
        assert!(!gone.exists());
        // Still resolvable by name -- absence is a value, not a miss.
        assert!(matches!(topo.lookup("gone"), ResourceRef::Resource(_)));
    }

    #[test]
    fn test_parent_links_resolved_dynamically() {
        let topo = sample_topology();

        let parents = topo.parent_groups_of("logs-2024");
        assert_eq!(parents.len(), 1);
        assert_eq!(parents[0].name(), "logs");

        let seq = topo.parent_sequence_of("metrics-2024").unwrap();
        assert_eq!(seq.name(), "metrics");

        assert!(topo.parent_groups_of("metrics-2024").is_empty());
        assert!(topo.parent_sequence_of("logs-2024").is_none());
    }

    #[test]
    fn test_bare_resources_skip_owned_leaves() {
        let topo = sample_topology();

        let bare: Vec<&str> = topo.bare_resources().map(Resource::name).collect();
        // logs-2024/logs-2025 are owned by the group, metrics-2024 by the
        // sequence; only the orphaned absent resource remains.
        assert_eq!(bare, vec!["gone"]);
    }

    #[test]
    fn test_group_leaves_do_not_flatten_sequences() {
        let topo = Topology::new(1)
            .with_resource(Resource::new("a-1"))
            .with_resource(Resource::new("m-1"))
            .with_sequence(ResourceSequence::new("m").with_generation("m-1"))
            .with_group(
                ResourceGroup::new("all")
                    .with_member("a-1")
                    .with_member("m"),
            );

        let leaves: Vec<&str> = topo
            .group_leaves("all")
            .into_iter()
            .map(Resource::name)
            .collect();
        assert_eq!(leaves, vec!["a-1"]);
    }

    #[test]
    fn test_names_of_scope() {
        let topo = sample_topology();

        let groups: Vec<&str> = topo.names_of(ResourceScope::Group).collect();
        assert_eq!(groups, vec!["logs"]);

        let sequences: Vec<&str> = topo.names_of(ResourceScope::Sequence).collect();
        assert_eq!(sequences, vec!["metrics"]);

        let resources: Vec<&str> = topo.names_of(ResourceScope::Resource).collect();
        assert_eq!(resources.len(), 4);
    }

    #[test]
    fn test_scope_of() {
        let topo = sample_topology();

        assert_eq!(topo.scope_of("logs-2024"), Some(ResourceScope::Resource));
        assert_eq!(topo.scope_of("logs"), Some(ResourceScope::Group));
        assert_eq!(topo.scope_of("metrics"), Some(ResourceScope::Sequence));
        assert_eq!(topo.scope_of("nope"), None);
    }

    #[test]
    fn test_version_is_preserved() {
        assert_eq!(sample_topology().version(), 7);
    }

    #[test]
    fn test_serde_round_trip() {
        let topo = sample_topology();
        let json = serde_json::to_string(&topo).unwrap();
        let back: Topology = serde_json::from_str(&json).unwrap();
        assert_eq!(topo, back);
    }
}
