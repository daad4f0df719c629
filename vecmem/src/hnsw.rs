//! Hierarchical Navigable Small World index
//!
//! Nodes live in an arena and refer to each other by `u32` slot. Graph
//! routing uses Euclidean distance; callers re-rank the returned ids with
//! whatever similarity they like against their own copy of the vectors.
//!
//! The index is a derived structure: it is never persisted and can always be
//! rebuilt by replaying `insert` over the stored records.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::HnswConfig;
use crate::math::euclidean_distance;

/// Arena slot of a node
type Slot = u32;

struct Node {
    id: String,
    vector: Vec<f32>,
    /// One neighbour list per layer `0..=level`, each at most `m` long
    neighbors: Vec<Vec<Slot>>,
}

impl Node {
    fn new(id: &str, vector: Vec<f32>, level: usize, m: usize) -> Self {
        Self {
            id: id.to_string(),
            vector,
            neighbors: (0..=level).map(|_| Vec::with_capacity(m + 1)).collect(),
        }
    }

    fn level(&self) -> usize {
        self.neighbors.len() - 1
    }

    fn neighbors_at(&self, layer: usize) -> &[Slot] {
        self.neighbors.get(layer).map_or(&[], Vec::as_slice)
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f32,
    slot: Slot,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.slot.cmp(&other.slot))
    }
}

/// Approximate k-NN index over string ids
pub struct HnswIndex {
    config: HnswConfig,
    nodes: Vec<Option<Node>>,
    free: Vec<Slot>,
    slots: HashMap<String, Slot>,
    entry: Option<Slot>,
    top_level: usize,
    rng: StdRng,
}

impl HnswIndex {
    pub fn new(config: HnswConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            nodes: Vec::new(),
            free: Vec::new(),
            slots: HashMap::new(),
            entry: None,
            top_level: 0,
            rng,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.slots.contains_key(id)
    }

    /// Highest layer currently in use
    pub fn top_level(&self) -> usize {
        self.top_level
    }

    /// Drop every node
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.slots.clear();
        self.entry = None;
        self.top_level = 0;
    }

    /// Insert a vector. An existing node with the same id is replaced.
    pub fn insert(&mut self, id: &str, vector: Vec<f32>) {
        if self.slots.contains_key(id) {
            self.remove(id);
        }

        let level = self.random_level();
        let query = vector.clone();
        let slot = self.allocate(Node::new(id, vector, level, self.config.m));
        self.slots.insert(id.to_string(), slot);

        let Some(entry) = self.entry else {
            self.entry = Some(slot);
            self.top_level = level;
            return;
        };

        // Greedy descent through layers the new node does not reach
        let mut nearest = entry;
        for layer in (level + 1..=self.top_level).rev() {
            nearest = self.greedy_closest(&query, nearest, layer);
        }

        for layer in (0..=level.min(self.top_level)).rev() {
            let found = self.search_level(&query, nearest, self.config.ef_construction, layer);
            if let Some(best) = found.first() {
                nearest = best.slot;
            }

            let selected: Vec<Slot> = found
                .iter()
                .map(|c| c.slot)
                .filter(|&s| s != slot)
                .take(self.config.m)
                .collect();

            if let Some(node) = self.nodes[slot as usize].as_mut() {
                node.neighbors[layer] = selected.clone();
            }
            for neighbor in selected {
                self.link(neighbor, slot, layer);
            }
        }

        if level > self.top_level {
            self.entry = Some(slot);
            self.top_level = level;
        }
    }

    /// Up to `ef` ids, nearest first
    pub fn search(&self, query: &[f32], ef: usize) -> Vec<String> {
        let Some(entry) = self.entry else {
            return Vec::new();
        };

        let mut nearest = entry;
        for layer in (1..=self.top_level).rev() {
            nearest = self.greedy_closest(query, nearest, layer);
        }

        self.search_level(query, nearest, ef, 0)
            .into_iter()
            .take(ef)
            .filter_map(|c| self.node(c.slot).map(|n| n.id.clone()))
            .collect()
    }

    /// Unlink a node and free its slot. Returns false if the id is unknown.
    ///
    /// Nodes that pointed at the removed one are offered its neighbours as
    /// replacements so the graph stays connected.
    pub fn remove(&mut self, id: &str) -> bool {
        let Some(slot) = self.slots.remove(id) else {
            return false;
        };
        let Some(removed) = self.nodes[slot as usize].take() else {
            return false;
        };
        self.free.push(slot);

        let mut repairs = Vec::new();
        for (index, node) in self.nodes.iter().enumerate() {
            let Some(node) = node else { continue };
            for (layer, list) in node.neighbors.iter().enumerate() {
                if !list.contains(&slot) {
                    continue;
                }
                let mut pool: Vec<Slot> = list.iter().copied().filter(|&s| s != slot).collect();
                for &candidate in removed.neighbors_at(layer) {
                    if candidate != index as Slot && !pool.contains(&candidate) {
                        pool.push(candidate);
                    }
                }
                repairs.push((index, layer, self.closest(&node.vector, pool)));
            }
        }
        for (index, layer, list) in repairs {
            if let Some(node) = self.nodes[index].as_mut() {
                node.neighbors[layer] = list;
            }
        }

        if self.entry == Some(slot) {
            self.elect_entry();
        }
        true
    }

    fn allocate(&mut self, node: Node) -> Slot {
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot as usize] = Some(node);
                slot
            }
            None => {
                self.nodes.push(Some(node));
                (self.nodes.len() - 1) as Slot
            }
        }
    }

    fn node(&self, slot: Slot) -> Option<&Node> {
        self.nodes.get(slot as usize).and_then(Option::as_ref)
    }

    fn distance_to(&self, query: &[f32], slot: Slot) -> f32 {
        self.node(slot)
            .map_or(f32::INFINITY, |n| euclidean_distance(query, &n.vector))
    }

    /// Fair coin per layer, capped at `max_level`
    fn random_level(&mut self) -> usize {
        let mut level = 0;
        while level < self.config.max_level && self.rng.gen_bool(0.5) {
            level += 1;
        }
        level
    }

    /// Highest-level live node becomes the entry point
    fn elect_entry(&mut self) {
        let best = self
            .nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_ref().map(|n| (i as Slot, n.level())))
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)));

        match best {
            Some((slot, level)) => {
                self.entry = Some(slot);
                self.top_level = level;
            }
            None => {
                self.entry = None;
                self.top_level = 0;
            }
        }
    }

    /// Add `to` to `from`'s list, evicting the farthest link past `m`
    fn link(&mut self, from: Slot, to: Slot, layer: usize) {
        let m = self.config.m;
        let overflow = match self.nodes[from as usize].as_mut() {
            Some(node) if layer <= node.level() => {
                let list = &mut node.neighbors[layer];
                if list.contains(&to) {
                    return;
                }
                list.push(to);
                list.len() > m
            }
            _ => return,
        };

        if overflow {
            let pruned = match self.node(from) {
                Some(node) => self.closest(&node.vector, node.neighbors[layer].clone()),
                None => return,
            };
            if let Some(node) = self.nodes[from as usize].as_mut() {
                node.neighbors[layer] = pruned;
            }
        }
    }

    /// The `m` slots of `pool` nearest to `base`, nearest first
    fn closest(&self, base: &[f32], pool: Vec<Slot>) -> Vec<Slot> {
        let mut scored: Vec<Candidate> = pool
            .into_iter()
            .map(|slot| Candidate {
                distance: self.distance_to(base, slot),
                slot,
            })
            .collect();
        scored.sort();
        scored.truncate(self.config.m);
        scored.into_iter().map(|c| c.slot).collect()
    }

    /// Width-1 greedy walk at one layer
    fn greedy_closest(&self, query: &[f32], start: Slot, layer: usize) -> Slot {
        let mut best = start;
        let mut best_distance = self.distance_to(query, start);
        loop {
            let mut improved = false;
            if let Some(node) = self.node(best) {
                for &neighbor in node.neighbors_at(layer) {
                    let d = self.distance_to(query, neighbor);
                    if d < best_distance {
                        best = neighbor;
                        best_distance = d;
                        improved = true;
                    }
                }
            }
            if !improved {
                return best;
            }
        }
    }

    /// Beam search at one layer; result sorted by ascending distance
    fn search_level(&self, query: &[f32], entry: Slot, ef: usize, layer: usize) -> Vec<Candidate> {
        let ef = ef.max(1);
        let start = Candidate {
            distance: self.distance_to(query, entry),
            slot: entry,
        };

        let mut visited: HashSet<Slot> = HashSet::from([entry]);
        let mut candidates = BinaryHeap::from([Reverse(start)]);
        // Max-heap: worst admitted result on top
        let mut results = BinaryHeap::from([start]);

        while let Some(Reverse(current)) = candidates.pop() {
            let worst = results.peek().map_or(f32::INFINITY, |c| c.distance);
            if current.distance > worst && results.len() >= ef {
                break;
            }

            let Some(node) = self.node(current.slot) else {
                continue;
            };
            for &neighbor in node.neighbors_at(layer) {
                if !visited.insert(neighbor) {
                    continue;
                }
                let distance = self.distance_to(query, neighbor);
                let worst = results.peek().map_or(f32::INFINITY, |c| c.distance);
                if results.len() < ef || distance < worst {
                    let candidate = Candidate {
                        distance,
                        slot: neighbor,
                    };
                    candidates.push(Reverse(candidate));
                    results.push(candidate);
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        results.into_sorted_vec()
    }
}
