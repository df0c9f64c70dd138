//! Explicit dependency graph of everything a deployment declares.
//!
//! Nodes are either resources that end up in a template, or deployment steps that
//! run after the stacks settle. An edge `from -> to` means `from` can only be
//! created once `to` exists. Edges inside one stack become `DependsOn`, edges that
//! cross stacks decide which stack deploys first.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};
use crate::resources::*;

pub type NodeId = usize;

/// which synthesized stack a node is placed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StackRole {
    Main,
    /// companion stack pinned to the cloudfront certificate region.
    Certificate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployStep {
    /// mirror the local asset directory into the bucket.
    AssetSync { bucket_name: String },
    /// invalidate cached paths once the sync has finished.
    Invalidation { paths: Vec<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Resource(Resource),
    Step(DeployStep),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub logical_id: String,
    pub kind: NodeKind,
    pub stack: StackRole,
}

impl Node {
    pub fn resource(&self) -> Option<&Resource> {
        match &self.kind {
            NodeKind::Resource(r) => Some(r),
            NodeKind::Step(_) => None,
        }
    }

    pub fn step(&self) -> Option<&DeployStep> {
        match &self.kind {
            NodeKind::Step(s) => Some(s),
            NodeKind::Resource(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DependencyKind {
    OriginBucket,
    OriginAccess,
    ViewerCertificate,
    AliasTarget,
    PolicyBucket,
    PolicyDistribution,
    CleanupTarget,
    CleanupRole,
    CleanupFunction,
    AssetDestination,
    InvalidationTarget,
    AssetsUploaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub kind: DependencyKind,
}

#[derive(Debug, Default, Clone)]
pub struct ResourceGraph {
    nodes: Vec<Node>,
    edges: BTreeSet<Edge>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_resource(&mut self, logical_id: &str, resource: Resource, stack: StackRole) -> Result<NodeId> {
        self.add_node(logical_id, NodeKind::Resource(resource), stack)
    }

    pub fn add_step(&mut self, logical_id: &str, step: DeployStep) -> Result<NodeId> {
        self.add_node(logical_id, NodeKind::Step(step), StackRole::Main)
    }

    fn add_node(&mut self, logical_id: &str, kind: NodeKind, stack: StackRole) -> Result<NodeId> {
        if let Some(err) = verify_resource_name(logical_id) {
            return Err(Error::validation(logical_id, err));
        }
        if self.find(logical_id).is_some() {
            return Err(Error::graph(format!("logical id {logical_id} is declared twice")));
        }
        self.nodes.push(Node { logical_id: logical_id.to_string(), kind, stack });
        Ok(self.nodes.len() - 1)
    }

    /// alias records are keyed by their record name: declaring the same name again
    /// retargets the existing record instead of adding a second one.
    pub fn upsert_alias_record(&mut self, logical_id: &str, record: Route53AliasRecord, stack: StackRole) -> Result<NodeId> {
        let distribution = self.find(&record.distribution_logical_id).ok_or_else(|| {
            Error::graph(format!("alias record {} targets unknown distribution {}", record.record_name, record.distribution_logical_id))
        })?;
        let existing = self.nodes.iter().position(|n| match n.resource() {
            Some(Resource::AliasRecord(r)) => r.record_name == record.record_name,
            _ => false,
        });
        let id = match existing {
            Some(id) => {
                self.nodes[id].kind = NodeKind::Resource(Resource::AliasRecord(record));
                self.edges.retain(|e| !(e.from == id && e.kind == DependencyKind::AliasTarget));
                id
            }
            None => self.add_resource(logical_id, Resource::AliasRecord(record), stack)?,
        };
        self.depend(id, distribution, DependencyKind::AliasTarget)?;
        Ok(id)
    }

    /// record that `from` needs `to` to exist first.
    pub fn depend(&mut self, from: NodeId, to: NodeId, kind: DependencyKind) -> Result<()> {
        if from >= self.nodes.len() || to >= self.nodes.len() {
            return Err(Error::graph(format!("edge {from} -> {to} references an unknown node")));
        }
        if from == to {
            return Err(Error::graph(format!("{} cannot depend on itself", self.nodes[from].logical_id)));
        }
        self.edges.insert(Edge { from, to, kind });
        Ok(())
    }

    pub fn find(&self, logical_id: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.logical_id == logical_id)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn dependencies_of(&self, id: NodeId) -> Vec<(NodeId, DependencyKind)> {
        self.edges.iter().filter(|e| e.from == id).map(|e| (e.to, e.kind)).collect()
    }

    pub fn resources(&self) -> impl Iterator<Item = (NodeId, &Node, &Resource)> {
        self.nodes().filter_map(|(id, n)| n.resource().map(|r| (id, n, r)))
    }

    pub fn steps(&self) -> impl Iterator<Item = (NodeId, &Node, &DeployStep)> {
        self.nodes().filter_map(|(id, n)| n.step().map(|s| (id, n, s)))
    }

    pub fn buckets(&self) -> Vec<(&Node, &S3Bucket)> {
        self.resources().filter_map(|(_, n, r)| match r {
            Resource::Bucket(b) => Some((n, b)),
            _ => None,
        }).collect()
    }

    pub fn certificates(&self) -> Vec<(&Node, &AcmCertificate)> {
        self.resources().filter_map(|(_, n, r)| match r {
            Resource::Certificate(c) => Some((n, c)),
            _ => None,
        }).collect()
    }

    pub fn distributions(&self) -> Vec<(&Node, &CloudfrontDistribution)> {
        self.resources().filter_map(|(_, n, r)| match r {
            Resource::Distribution(d) => Some((n, d)),
            _ => None,
        }).collect()
    }

    pub fn alias_records(&self) -> Vec<(&Node, &Route53AliasRecord)> {
        self.resources().filter_map(|(_, n, r)| match r {
            Resource::AliasRecord(a) => Some((n, a)),
            _ => None,
        }).collect()
    }

    /// every node after all of its dependencies. ties are broken by insertion order
    /// so the result is stable across runs.
    pub fn topological_order(&self) -> Result<Vec<NodeId>> {
        let mut remaining_deps: BTreeMap<NodeId, usize> = (0..self.nodes.len()).map(|id| (id, 0)).collect();
        let mut dependents: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
        for edge in &self.edges {
            *remaining_deps.entry(edge.from).or_default() += 1;
            dependents.entry(edge.to).or_default().push(edge.from);
        }
        let mut ready: BTreeSet<NodeId> = remaining_deps.iter().filter(|(_, c)| **c == 0).map(|(id, _)| *id).collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = ready.pop_first() {
            order.push(id);
            for dependent in dependents.get(&id).map(|v| v.as_slice()).unwrap_or_default() {
                if let Some(count) = remaining_deps.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(*dependent);
                    }
                }
            }
        }
        if order.len() != self.nodes.len() {
            let stuck: Vec<&str> = remaining_deps.iter()
                .filter(|(_, c)| **c > 0)
                .map(|(id, _)| self.nodes[*id].logical_id.as_str())
                .collect();
            return Err(Error::graph(format!("dependency cycle between {:?}", stuck)));
        }
        Ok(order)
    }

    /// the rules every composition must satisfy, independent of mode.
    pub fn check_invariants(&self) -> Result<()> {
        for (_, node, resource) in self.resources() {
            resource.validate().map_err(|e| Error::validation(&node.logical_id, e))?;
        }
        let buckets = self.buckets();
        if buckets.len() != 1 {
            return Err(Error::graph(format!("expected exactly one bucket, found {}", buckets.len())));
        }
        if self.certificates().len() > 1 {
            return Err(Error::graph("at most one certificate may be declared"));
        }
        let distributions = self.distributions();
        if distributions.len() > 1 {
            return Err(Error::graph("at most one distribution may be declared"));
        }
        if !distributions.is_empty() {
            let (bucket_node, bucket) = buckets[0];
            if bucket.public_read {
                return Err(Error::validation(
                    &bucket_node.logical_id,
                    "bucket must not be public-read when it is fronted by a distribution",
                ));
            }
        }
        self.topological_order()?;
        Ok(())
    }
}
