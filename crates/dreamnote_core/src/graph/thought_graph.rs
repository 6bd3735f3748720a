//! In-memory thought graph over one combined view.
//!
//! # Responsibility
//! - Resolve a position for every node (stored or spiral fallback).
//! - Hold the manual link set and keep it free of dangling endpoints.
//! - Answer drag-release merge-target queries.
//!
//! # Invariants
//! - Every manual link references two distinct nodes present in the graph.
//! - Node order follows the input order (the combined view order).

use super::bonds::{self, Bond};
use super::merge::{self, MergePlan};
use super::GraphConsistencyError;
use crate::config::GraphConfig;
use crate::emotion::EmotionKey;
use crate::model::link::ManualLink;
use crate::model::thought::{Position, Thought, ThoughtId};
use std::collections::{BTreeSet, HashMap};

/// One positioned thought.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub thought: Thought,
    /// Stored position, or the layout fallback when none is stored.
    pub position: Position,
    pub dominant: EmotionKey,
}

impl GraphNode {
    pub fn from_thought(thought: Thought, fallback: Position) -> Self {
        let position = thought.position.unwrap_or(fallback);
        let dominant = thought.dominant_emotion();
        Self {
            thought,
            position,
            dominant,
        }
    }

    pub fn id(&self) -> &ThoughtId {
        &self.thought.id
    }

    pub fn size(&self) -> f64 {
        self.thought.size
    }

    /// Thought with the resolved position written back.
    pub fn placed_thought(&self) -> Thought {
        let mut thought = self.thought.clone();
        thought.move_to(self.position);
        thought
    }
}

#[derive(Debug, Clone)]
pub struct ThoughtGraph {
    nodes: Vec<GraphNode>,
    index: HashMap<ThoughtId, usize>,
    links: BTreeSet<ManualLink>,
    dangling: Vec<ManualLink>,
    config: GraphConfig,
}

impl ThoughtGraph {
    /// Builds a graph; links whose endpoints are missing are set aside.
    ///
    /// Nodes without a stored position take spiral slots in view order.
    pub fn new(
        thoughts: impl IntoIterator<Item = Thought>,
        links: impl IntoIterator<Item = ManualLink>,
        config: GraphConfig,
    ) -> Self {
        let nodes: Vec<GraphNode> = thoughts
            .into_iter()
            .enumerate()
            .map(|(slot, thought)| GraphNode::from_thought(thought, Position::spiral(slot)))
            .collect();
        let index = nodes
            .iter()
            .enumerate()
            .map(|(position, node)| (node.id().clone(), position))
            .collect::<HashMap<_, _>>();

        let (links, dangling): (BTreeSet<_>, Vec<_>) = links.into_iter().fold(
            (BTreeSet::new(), Vec::new()),
            |(mut kept, mut dropped), link| {
                if index.contains_key(link.low()) && index.contains_key(link.high()) {
                    kept.insert(link);
                } else {
                    dropped.push(link);
                }
                (kept, dropped)
            },
        );

        if !dangling.is_empty() {
            log::debug!(
                "event=graph_build module=graph status=pruned dangling_links={}",
                dangling.len()
            );
        }

        Self {
            nodes,
            index,
            links,
            dangling,
            config,
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn node(&self, id: &ThoughtId) -> Option<&GraphNode> {
        self.index.get(id).map(|position| &self.nodes[*position])
    }

    pub fn contains(&self, id: &ThoughtId) -> bool {
        self.index.contains_key(id)
    }

    pub fn manual_links(&self) -> impl Iterator<Item = &ManualLink> {
        self.links.iter()
    }

    /// Links dropped at construction because an endpoint was absent.
    pub fn dangling_links(&self) -> &[ManualLink] {
        &self.dangling
    }

    /// Recomputed from the current nodes on every call.
    pub fn automatic_bonds(&self) -> Vec<Bond> {
        bonds::automatic_bonds(&self.nodes, &self.config)
    }

    /// Ids connected to `id` through a manual link.
    pub fn linked_to(&self, id: &ThoughtId) -> BTreeSet<ThoughtId> {
        self.links
            .iter()
            .filter_map(|link| link.other(id).cloned())
            .collect()
    }

    /// Adds a link; `Ok(false)` when it already existed.
    pub fn add_manual_link(
        &mut self,
        a: &ThoughtId,
        b: &ThoughtId,
    ) -> Result<bool, GraphConsistencyError> {
        let link = self.checked_link(a, b)?;
        Ok(self.links.insert(link))
    }

    /// Removes a link; `Ok(false)` when there was none.
    pub fn remove_manual_link(
        &mut self,
        a: &ThoughtId,
        b: &ThoughtId,
    ) -> Result<bool, GraphConsistencyError> {
        let link = self.checked_link(a, b)?;
        Ok(self.links.remove(&link))
    }

    /// Moves a node by a delta and returns its new position.
    pub fn drag_by(
        &mut self,
        id: &ThoughtId,
        dx: f64,
        dy: f64,
    ) -> Result<Position, GraphConsistencyError> {
        let position = *self
            .index
            .get(id)
            .ok_or_else(|| GraphConsistencyError::UnknownThought(id.clone()))?;
        let node = &mut self.nodes[position];
        node.position = node.position.offset(dx, dy);
        node.thought.move_to(node.position);
        Ok(node.position)
    }

    /// Closest other node that `id` overlaps enough to merge into.
    ///
    /// A pair qualifies when `distance < (size_a + size_b) / divisor`.
    pub fn merge_target(&self, id: &ThoughtId) -> Option<&GraphNode> {
        let dragged = self.node(id)?;
        self.nodes
            .iter()
            .filter(|candidate| candidate.id() != dragged.id())
            .map(|candidate| (candidate, dragged.position.distance_to(&candidate.position)))
            .filter(|(candidate, distance)| {
                *distance
                    < (dragged.size() + candidate.size()) / self.config.merge_proximity_divisor
            })
            .min_by(|(left, left_distance), (right, right_distance)| {
                left_distance
                    .total_cmp(right_distance)
                    .then_with(|| left.id().cmp(right.id()))
            })
            .map(|(candidate, _)| candidate)
    }

    /// Plans merging `a` into `b` against this graph's links and positions.
    pub fn plan_merge(
        &self,
        a: &ThoughtId,
        b: &ThoughtId,
    ) -> Result<MergePlan, GraphConsistencyError> {
        if a == b {
            return Err(GraphConsistencyError::SelfMerge(a.clone()));
        }
        let first = self
            .node(a)
            .ok_or_else(|| GraphConsistencyError::UnknownThought(a.clone()))?;
        let second = self
            .node(b)
            .ok_or_else(|| GraphConsistencyError::UnknownThought(b.clone()))?;
        let links: Vec<ManualLink> = self.links.iter().cloned().collect();
        merge::plan_merge(&first.placed_thought(), &second.placed_thought(), &links)
    }

    /// Replaces the two inputs with the merged node and rewires links.
    pub fn apply_merge(&mut self, plan: &MergePlan) {
        let rewired = plan.rewire(self.links.iter());
        let mut nodes: Vec<Thought> = self
            .nodes
            .drain(..)
            .filter(|node| !plan.retired.contains(node.id()))
            .map(|node| node.placed_thought())
            .collect();
        nodes.insert(0, plan.merged.clone());
        *self = Self::new(nodes, rewired, self.config);
    }

    /// Removes a node and every link touching it.
    pub fn remove_node(&mut self, id: &ThoughtId) -> Option<Thought> {
        let position = self.index.get(id).copied()?;
        let removed = self.nodes.remove(position);
        self.links.retain(|link| !link.touches(id));
        self.index = self
            .nodes
            .iter()
            .enumerate()
            .map(|(position, node)| (node.id().clone(), position))
            .collect();
        Some(removed.thought)
    }

    fn checked_link(
        &self,
        a: &ThoughtId,
        b: &ThoughtId,
    ) -> Result<ManualLink, GraphConsistencyError> {
        for id in [a, b] {
            if !self.contains(id) {
                return Err(GraphConsistencyError::UnknownThought(id.clone()));
            }
        }
        ManualLink::new(a.clone(), b.clone())
            .ok_or_else(|| GraphConsistencyError::SelfLink(a.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::ThoughtGraph;
    use crate::config::GraphConfig;
    use crate::graph::GraphConsistencyError;
    use crate::model::link::ManualLink;
    use crate::model::thought::{Position, Thought, ThoughtId};
    use chrono::Utc;

    fn placed(id: &str, text: &str, x: f64, y: f64) -> Thought {
        let mut thought = Thought::with_id(ThoughtId::new(id), Utc::now(), text);
        thought.move_to(Position::new(x, y));
        thought
    }

    fn link(a: &str, b: &str) -> ManualLink {
        ManualLink::new(ThoughtId::new(a), ThoughtId::new(b)).expect("distinct ids")
    }

    #[test]
    fn unplaced_nodes_take_spiral_slots() {
        let thoughts = vec![
            Thought::with_id(ThoughtId::new("a"), Utc::now(), "a"),
            Thought::with_id(ThoughtId::new("b"), Utc::now(), "b"),
        ];
        let graph = ThoughtGraph::new(thoughts, Vec::new(), GraphConfig::default());
        assert_eq!(graph.nodes()[0].position, Position::spiral(0));
        assert_eq!(graph.nodes()[1].position, Position::spiral(1));
    }

    #[test]
    fn dangling_links_are_set_aside() {
        let graph = ThoughtGraph::new(
            vec![placed("a", "a", 0.0, 0.0), placed("b", "b", 10.0, 0.0)],
            vec![link("a", "b"), link("a", "gone")],
            GraphConfig::default(),
        );
        assert_eq!(graph.manual_links().count(), 1);
        assert_eq!(graph.dangling_links(), &[link("a", "gone")]);
    }

    #[test]
    fn manual_link_operations_validate_endpoints() {
        let mut graph = ThoughtGraph::new(
            vec![placed("a", "a", 0.0, 0.0), placed("b", "b", 10.0, 0.0)],
            Vec::new(),
            GraphConfig::default(),
        );
        let a = ThoughtId::new("a");
        let b = ThoughtId::new("b");

        assert_eq!(graph.add_manual_link(&a, &b), Ok(true));
        assert_eq!(graph.add_manual_link(&b, &a), Ok(false));
        assert_eq!(
            graph.add_manual_link(&a, &a),
            Err(GraphConsistencyError::SelfLink(a.clone()))
        );
        assert_eq!(
            graph.add_manual_link(&a, &ThoughtId::new("z")),
            Err(GraphConsistencyError::UnknownThought(ThoughtId::new("z")))
        );
        assert_eq!(graph.remove_manual_link(&b, &a), Ok(true));
        assert_eq!(graph.remove_manual_link(&a, &b), Ok(false));
    }

    #[test]
    fn merge_target_requires_overlap_and_picks_closest() {
        // Empty text gives size 60, so the threshold is 120 / 2.5 = 48.
        let mut graph = ThoughtGraph::new(
            vec![
                placed("drag", "", 0.0, 0.0),
                placed("near", "", 100.0, 0.0),
                placed("far", "", 200.0, 0.0),
            ],
            Vec::new(),
            GraphConfig::default(),
        );
        let drag = ThoughtId::new("drag");
        assert!(graph.merge_target(&drag).is_none());

        graph.drag_by(&drag, 60.0, 0.0).expect("drag");
        assert_eq!(graph.merge_target(&drag).map(|node| node.id().as_str()), Some("near"));

        graph.drag_by(&drag, 100.0, 0.0).expect("drag");
        assert_eq!(graph.merge_target(&drag).map(|node| node.id().as_str()), Some("far"));
    }

    #[test]
    fn apply_merge_swaps_nodes_and_rewires_links() {
        let mut graph = ThoughtGraph::new(
            vec![
                placed("a", "a", 0.0, 0.0),
                placed("b", "b", 40.0, 0.0),
                placed("c", "c", 400.0, 0.0),
            ],
            vec![link("a", "c"), link("b", "c")],
            GraphConfig::default(),
        );
        let plan = graph
            .plan_merge(&ThoughtId::new("a"), &ThoughtId::new("b"))
            .expect("plan");
        graph.apply_merge(&plan);

        assert_eq!(graph.len(), 2);
        assert!(!graph.contains(&ThoughtId::new("a")));
        assert_eq!(
            graph.node(plan.merged_id()).map(|node| node.position),
            Some(Position::new(20.0, 0.0))
        );
        assert_eq!(
            graph.linked_to(&ThoughtId::new("c")).into_iter().collect::<Vec<_>>(),
            vec![plan.merged_id().clone()]
        );
    }

    #[test]
    fn remove_node_prunes_its_links() {
        let mut graph = ThoughtGraph::new(
            vec![
                placed("a", "a", 0.0, 0.0),
                placed("b", "b", 10.0, 0.0),
                placed("c", "c", 20.0, 0.0),
            ],
            vec![link("a", "b"), link("b", "c")],
            GraphConfig::default(),
        );
        let removed = graph.remove_node(&ThoughtId::new("b"));
        assert_eq!(removed.map(|thought| thought.id), Some(ThoughtId::new("b")));
        assert_eq!(graph.manual_links().count(), 0);
        assert!(graph.node(&ThoughtId::new("c")).is_some());
    }
}
