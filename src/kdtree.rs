//! Balanced 3D k-d tree over agent positions.
//!
//! Rebuilt from scratch at the start of every simulation step and queried
//! read-only by every agent during the parallel phase. Nodes live in a flat
//! array; leaves cover ranges of a permuted agent-index array.

use crate::structs::{Agent, Vector3, Workspace};

pub const MAX_LEAF_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, Default)]
struct Node {
    begin: usize,
    end: usize,
    left: usize,
    right: usize,
    min_coord: [f64; 3],
    max_coord: [f64; 3],
}

#[derive(Debug, Default)]
pub struct KdTree {
    indices: Vec<usize>,
    nodes: Vec<Node>,
}

fn coord(p: &Vector3, axis: usize) -> f64 {
    match axis {
        0 => p.x,
        1 => p.y,
        _ => p.z,
    }
}

impl KdTree {
    pub fn new() -> Self {
        KdTree::default()
    }

    /// Rebuilds the tree over the current agent positions. Buffers are
    /// reused; nothing else may mutate `agents` until the next rebuild.
    pub fn build(&mut self, agents: &[Agent]) {
        self.indices.clear();
        self.indices.extend(0..agents.len());
        self.nodes.clear();

        if agents.is_empty() {
            return;
        }

        self.nodes.resize(2 * agents.len() - 1, Node::default());
        self.build_recursive(agents, 0, agents.len(), 0);
    }

    fn build_recursive(&mut self, agents: &[Agent], begin: usize, end: usize, node: usize) {
        let first = agents[self.indices[begin]].position;
        let mut min_coord = [first.x, first.y, first.z];
        let mut max_coord = min_coord;

        for i in begin + 1..end {
            let p = agents[self.indices[i]].position;
            for axis in 0..3 {
                min_coord[axis] = min_coord[axis].min(coord(&p, axis));
                max_coord[axis] = max_coord[axis].max(coord(&p, axis));
            }
        }

        self.nodes[node].begin = begin;
        self.nodes[node].end = end;
        self.nodes[node].min_coord = min_coord;
        self.nodes[node].max_coord = max_coord;

        if end - begin <= MAX_LEAF_SIZE {
            return;
        }

        let extent = [
            max_coord[0] - min_coord[0],
            max_coord[1] - min_coord[1],
            max_coord[2] - min_coord[2],
        ];
        let axis = if extent[0] >= extent[1] && extent[0] >= extent[2] {
            0
        } else if extent[1] >= extent[2] {
            1
        } else {
            2
        };
        let split_value = 0.5 * (min_coord[axis] + max_coord[axis]);

        let mut left = begin;
        let mut right = end;
        while left < right {
            while left < right && coord(&agents[self.indices[left]].position, axis) < split_value {
                left += 1;
            }
            while right > left
                && coord(&agents[self.indices[right - 1]].position, axis) >= split_value
            {
                right -= 1;
            }
            if left < right {
                self.indices.swap(left, right - 1);
                left += 1;
                right -= 1;
            }
        }

        let mut left_size = left - begin;
        if left_size == 0 {
            // Degenerate partition (all agents on one side of the midpoint);
            // force one element left so both subtrees shrink.
            left_size = 1;
            left += 1;
        }

        self.nodes[node].left = node + 1;
        self.nodes[node].right = node + 2 * left_size;

        self.build_recursive(agents, begin, left, node + 1);
        self.build_recursive(agents, left, end, node + 2 * left_size);
    }

    /// Collects the neighbors of `agent` within `sqrt(range_sq)` into the
    /// agent's workspace, nearest first. The search radius tightens as the
    /// bounded neighbor list fills up.
    pub fn query_neighbors(
        &self,
        agents: &[Agent],
        agent: &Agent,
        ws: &mut Workspace,
        mut range_sq: f64,
    ) {
        if self.nodes.is_empty() {
            return;
        }
        self.query_recursive(agents, agent, ws, &mut range_sq, 0);
    }

    fn query_recursive(
        &self,
        agents: &[Agent],
        agent: &Agent,
        ws: &mut Workspace,
        range_sq: &mut f64,
        node: usize,
    ) {
        let n = self.nodes[node];

        if n.end - n.begin <= MAX_LEAF_SIZE {
            for i in n.begin..n.end {
                let other = self.indices[i];
                if other != agent.id {
                    let dist_sq = (agents[other].position - agent.position).magnitude_sq();
                    ws.insert_neighbor(other, dist_sq, agent.max_neighbors, range_sq);
                }
            }
            return;
        }

        let dist_left = dist_sq_to_box(&self.nodes[n.left], &agent.position);
        let dist_right = dist_sq_to_box(&self.nodes[n.right], &agent.position);

        if dist_left < dist_right {
            if dist_left < *range_sq {
                self.query_recursive(agents, agent, ws, range_sq, n.left);
                if dist_right < *range_sq {
                    self.query_recursive(agents, agent, ws, range_sq, n.right);
                }
            }
        } else if dist_right < *range_sq {
            self.query_recursive(agents, agent, ws, range_sq, n.right);
            if dist_left < *range_sq {
                self.query_recursive(agents, agent, ws, range_sq, n.left);
            }
        }
    }
}

fn dist_sq_to_box(node: &Node, p: &Vector3) -> f64 {
    let mut sum = 0.0;
    for axis in 0..3 {
        let v = coord(p, axis);
        let outside = (node.min_coord[axis] - v).max(0.0) + (v - node.max_coord[axis]).max(0.0);
        sum += outside * outside;
    }
    sum
}
