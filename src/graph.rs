//! Firm graphs built from worker transitions.
//!
//! `FirmGraph` is an undirected multigraph over firms: one edge per move.
//! `ObservationGraph` is the bipartite worker-firm multigraph used for the
//! leave-one-observation-out notion: one edge per mover spell.

use std::collections::HashMap;

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::unionfind::UnionFind;
use petgraph::visit::EdgeRef;

/// Adjacency lists keyed by node index, with edge ids so parallel edges stay
/// distinguishable during depth-first search.
struct Adjacency {
    neighbors: Vec<Vec<(usize, usize)>>,
    endpoints: Vec<(usize, usize)>,
}

impl Adjacency {
    fn from_graph<N, E>(graph: &UnGraph<N, E>) -> Self {
        let mut neighbors = vec![Vec::new(); graph.node_count()];
        let mut endpoints = Vec::with_capacity(graph.edge_count());
        for edge in graph.edge_references() {
            let (a, b) = (edge.source().index(), edge.target().index());
            let id = edge.id().index();
            neighbors[a].push((b, id));
            neighbors[b].push((a, id));
            endpoints.push((a, b));
        }
        Self {
            neighbors,
            endpoints,
        }
    }

    /// Iterative Hopcroft-Tarjan over the whole graph.
    ///
    /// Calls `on_tree_edge(edge_stack, edge, separates, is_bridge)` when the
    /// search retreats over a tree edge, once the child's low point is final.
    /// `separates` holds when the parent cuts the child's subtree off;
    /// `is_bridge` when the edge itself does. Tree and back edges are pushed on
    /// the edge stack as they are first seen.
    fn search(&self, mut on_tree_edge: impl FnMut(&mut Vec<usize>, usize, bool, bool)) {
        const UNSEEN: usize = usize::MAX;
        let n = self.neighbors.len();
        let mut disc = vec![UNSEEN; n];
        let mut low = vec![0; n];
        let mut clock = 0;
        let mut edge_stack: Vec<usize> = Vec::new();

        for root in 0..n {
            if disc[root] != UNSEEN {
                continue;
            }
            disc[root] = clock;
            low[root] = clock;
            clock += 1;

            // (node, edge used to reach it, next neighbor position)
            let mut stack: Vec<(usize, Option<usize>, usize)> = vec![(root, None, 0)];
            while let Some(top) = stack.last_mut() {
                let (v, parent_edge, next) = *top;
                if next < self.neighbors[v].len() {
                    top.2 += 1;
                    let (w, e) = self.neighbors[v][next];
                    if Some(e) == parent_edge {
                        continue;
                    }
                    if disc[w] == UNSEEN {
                        edge_stack.push(e);
                        disc[w] = clock;
                        low[w] = clock;
                        clock += 1;
                        stack.push((w, Some(e), 0));
                    } else if disc[w] < disc[v] {
                        edge_stack.push(e);
                        low[v] = low[v].min(disc[w]);
                    }
                } else {
                    stack.pop();
                    if let (Some(&(u, _, _)), Some(e)) = (stack.last(), parent_edge) {
                        low[u] = low[u].min(low[v]);
                        on_tree_edge(&mut edge_stack, e, low[v] >= disc[u], low[v] > disc[u]);
                    }
                }
            }
        }
    }

    fn biconnected_components(&self) -> Vec<Vec<usize>> {
        let mut components = Vec::new();
        let mut covered = vec![false; self.neighbors.len()];

        self.search(|edge_stack, tree_edge, separates, _| {
            if !separates {
                return;
            }
            let mut nodes = Vec::new();
            while let Some(e) = edge_stack.pop() {
                let (a, b) = self.endpoints[e];
                for v in [a, b] {
                    if !nodes.contains(&v) {
                        nodes.push(v);
                    }
                }
                if e == tree_edge {
                    break;
                }
            }
            for v in &nodes {
                covered[*v] = true;
            }
            nodes.sort_unstable();
            components.push(nodes);
        });

        // Nodes without edges form their own component.
        for (v, seen) in covered.into_iter().enumerate() {
            if !seen && self.neighbors[v].is_empty() {
                components.push(vec![v]);
            }
        }
        components
    }

    fn bridges(&self) -> Vec<usize> {
        let mut bridges = Vec::new();
        self.search(|_, tree_edge, _, is_bridge| {
            if is_bridge {
                bridges.push(tree_edge);
            }
        });
        bridges.sort_unstable();
        bridges
    }
}

/// Firm adjacency multigraph.
pub struct FirmGraph {
    graph: UnGraph<i64, ()>,
    node_map: HashMap<i64, NodeIndex>,
}

impl FirmGraph {
    /// A graph with every firm as a vertex and no edges.
    pub fn new(firms: impl IntoIterator<Item = i64>) -> Self {
        let mut graph = UnGraph::new_undirected();
        let mut node_map = HashMap::new();
        for firm in firms {
            node_map
                .entry(firm)
                .or_insert_with(|| graph.add_node(firm));
        }
        Self { graph, node_map }
    }

    /// Add a move between two firms. Self loops carry no connectivity and are skipped.
    pub fn add_link(&mut self, a: i64, b: i64) {
        if a == b {
            return;
        }
        let a = self.node(a);
        let b = self.node(b);
        self.graph.add_edge(a, b, ());
    }

    fn node(&mut self, firm: i64) -> NodeIndex {
        let graph = &mut self.graph;
        *self
            .node_map
            .entry(firm)
            .or_insert_with(|| graph.add_node(firm))
    }

    pub fn n_firms(&self) -> usize {
        self.graph.node_count()
    }

    pub fn n_links(&self) -> usize {
        self.graph.edge_count()
    }

    fn firms_of(&self, nodes: &[usize]) -> Vec<i64> {
        let mut firms: Vec<i64> = nodes
            .iter()
            .map(|v| self.graph[NodeIndex::new(*v)])
            .collect();
        firms.sort_unstable();
        firms
    }

    /// Connected components, ordered by their first firm in insertion order.
    pub fn connected_components(&self) -> Vec<Vec<i64>> {
        let mut sets = UnionFind::<usize>::new(self.graph.node_count());
        for edge in self.graph.edge_references() {
            sets.union(edge.source().index(), edge.target().index());
        }

        let mut order: Vec<usize> = Vec::new();
        let mut members: HashMap<usize, Vec<usize>> = HashMap::new();
        for (v, root) in sets.into_labeling().into_iter().enumerate() {
            let entry = members.entry(root).or_insert_with(|| {
                order.push(root);
                Vec::new()
            });
            entry.push(v);
        }

        order
            .into_iter()
            .filter_map(|root| members.remove(&root))
            .map(|nodes| self.firms_of(&nodes))
            .collect()
    }

    /// Biconnected components: maximal firm sets with no cut firm.
    ///
    /// A single link forms a two-firm component and a firm with no links is
    /// a component of its own, so every firm belongs to at least one.
    pub fn biconnected_components(&self) -> Vec<Vec<i64>> {
        Adjacency::from_graph(&self.graph)
            .biconnected_components()
            .into_iter()
            .map(|nodes| self.firms_of(&nodes))
            .collect()
    }
}

/// Endpoint of an observation edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Party {
    Worker(i64),
    Firm(i64),
}

/// Bipartite worker-firm multigraph with one edge per observation.
pub struct ObservationGraph {
    graph: UnGraph<Party, usize>,
    node_map: HashMap<Party, NodeIndex>,
}

impl ObservationGraph {
    pub fn new() -> Self {
        Self {
            graph: UnGraph::new_undirected(),
            node_map: HashMap::new(),
        }
    }

    /// Add observation `id`: worker `i` at firm `j`.
    pub fn add_observation(&mut self, id: usize, i: i64, j: i64) {
        let worker = self.node(Party::Worker(i));
        let firm = self.node(Party::Firm(j));
        self.graph.add_edge(worker, firm, id);
    }

    fn node(&mut self, party: Party) -> NodeIndex {
        let graph = &mut self.graph;
        *self
            .node_map
            .entry(party)
            .or_insert_with(|| graph.add_node(party))
    }

    /// Observations whose removal disconnects the graph, sorted.
    pub fn bridges(&self) -> Vec<usize> {
        let mut ids: Vec<usize> = Adjacency::from_graph(&self.graph)
            .bridges()
            .into_iter()
            .map(|e| self.graph[petgraph::graph::EdgeIndex::new(e)])
            .collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for ObservationGraph {
    fn default() -> Self {
        Self::new()
    }
}
