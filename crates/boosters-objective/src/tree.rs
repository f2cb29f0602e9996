//! Regression tree with writable leaf-value slots.
//!
//! The tree grower owns topology; objectives only ever rewrite leaf values
//! through [`RegTree::set_leaf_value`]. [`RegTree::topology`] captures
//! everything except leaf values so callers can verify that a leaf update
//! left the structure untouched.

use crate::error::{ObjectiveError, Result};

/// Canonical node identifier. Index into the tree's SoA arrays (0 = root).
pub type NodeId = u32;

/// Structure-of-Arrays regression tree.
#[derive(Debug, Clone, PartialEq)]
pub struct RegTree {
    /// Split feature index per node
    split_indices: Box<[u32]>,
    /// Split threshold per node
    split_thresholds: Box<[f32]>,
    /// Left child index per node (only valid for non-leaf nodes)
    left_children: Box<[NodeId]>,
    /// Right child index per node (only valid for non-leaf nodes)
    right_children: Box<[NodeId]>,
    /// Default direction for missing values (true = left)
    default_left: Box<[bool]>,
    is_leaf: Box<[bool]>,
    /// Leaf values (indexed by node, only meaningful for leaves)
    leaf_values: Box<[f32]>,
}

/// Snapshot of a tree's structure, excluding leaf values.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeTopology {
    pub split_indices: Vec<u32>,
    pub split_thresholds: Vec<f32>,
    pub left_children: Vec<NodeId>,
    pub right_children: Vec<NodeId>,
    pub default_left: Vec<bool>,
    pub is_leaf: Vec<bool>,
}

impl RegTree {
    /// Single-leaf tree.
    pub fn stump(value: f32) -> Self {
        let mut builder = TreeBuilder::new();
        builder.add_leaf(value);
        builder.build()
    }

    #[inline]
    pub fn n_nodes(&self) -> usize {
        self.is_leaf.len()
    }

    #[inline]
    pub fn is_leaf(&self, node: NodeId) -> bool {
        self.is_leaf[node as usize]
    }

    #[inline]
    pub fn split_index(&self, node: NodeId) -> u32 {
        self.split_indices[node as usize]
    }

    #[inline]
    pub fn split_threshold(&self, node: NodeId) -> f32 {
        self.split_thresholds[node as usize]
    }

    #[inline]
    pub fn left_child(&self, node: NodeId) -> NodeId {
        self.left_children[node as usize]
    }

    #[inline]
    pub fn right_child(&self, node: NodeId) -> NodeId {
        self.right_children[node as usize]
    }

    #[inline]
    pub fn default_left(&self, node: NodeId) -> bool {
        self.default_left[node as usize]
    }

    #[inline]
    pub fn leaf_value(&self, node: NodeId) -> f32 {
        self.leaf_values[node as usize]
    }

    /// Leaf node ids in index order.
    pub fn leaves(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.n_nodes() as NodeId).filter(|&n| self.is_leaf(n))
    }

    pub fn n_leaves(&self) -> usize {
        self.leaves().count()
    }

    /// Overwrite the value of a leaf. Fails if `node` is not a leaf.
    pub fn set_leaf_value(&mut self, node: NodeId, value: f32) -> Result<()> {
        self.check_leaf(node)?;
        self.leaf_values[node as usize] = value;
        Ok(())
    }

    /// Ensure `node` exists and is a leaf.
    pub fn check_leaf(&self, node: NodeId) -> Result<()> {
        if (node as usize) < self.n_nodes() && self.is_leaf(node) {
            Ok(())
        } else {
            Err(ObjectiveError::InvalidLeaf {
                node,
                n_nodes: self.n_nodes(),
            })
        }
    }

    /// Snapshot everything except leaf values.
    pub fn topology(&self) -> TreeTopology {
        TreeTopology {
            split_indices: self.split_indices.to_vec(),
            split_thresholds: self.split_thresholds.to_vec(),
            left_children: self.left_children.to_vec(),
            right_children: self.right_children.to_vec(),
            default_left: self.default_left.to_vec(),
            is_leaf: self.is_leaf.to_vec(),
        }
    }
}

/// Builder for constructing a [`RegTree`] node by node.
#[derive(Debug, Default)]
pub struct TreeBuilder {
    split_indices: Vec<u32>,
    split_thresholds: Vec<f32>,
    left_children: Vec<NodeId>,
    right_children: Vec<NodeId>,
    default_left: Vec<bool>,
    is_leaf: Vec<bool>,
    leaf_values: Vec<f32>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a split node. Returns the node index.
    pub fn add_split(
        &mut self,
        feature_index: u32,
        threshold: f32,
        default_left: bool,
        left_child: NodeId,
        right_child: NodeId,
    ) -> NodeId {
        let idx = self.is_leaf.len() as NodeId;
        self.split_indices.push(feature_index);
        self.split_thresholds.push(threshold);
        self.left_children.push(left_child);
        self.right_children.push(right_child);
        self.default_left.push(default_left);
        self.is_leaf.push(false);
        self.leaf_values.push(0.0);
        idx
    }

    /// Add a leaf node. Returns the node index.
    pub fn add_leaf(&mut self, value: f32) -> NodeId {
        let idx = self.is_leaf.len() as NodeId;
        self.split_indices.push(0);
        self.split_thresholds.push(0.0);
        self.left_children.push(0);
        self.right_children.push(0);
        self.default_left.push(false);
        self.is_leaf.push(true);
        self.leaf_values.push(value);
        idx
    }

    /// Build the tree.
    ///
    /// # Panics
    ///
    /// Panics if no node was added or a child index is out of bounds.
    pub fn build(self) -> RegTree {
        let n_nodes = self.is_leaf.len();
        assert!(n_nodes > 0, "tree must have at least one node");
        for (node, &leaf) in self.is_leaf.iter().enumerate() {
            if !leaf {
                assert!(
                    (self.left_children[node] as usize) < n_nodes
                        && (self.right_children[node] as usize) < n_nodes,
                    "node {node} has a child out of bounds"
                );
            }
        }

        RegTree {
            split_indices: self.split_indices.into_boxed_slice(),
            split_thresholds: self.split_thresholds.into_boxed_slice(),
            left_children: self.left_children.into_boxed_slice(),
            right_children: self.right_children.into_boxed_slice(),
            default_left: self.default_left.into_boxed_slice(),
            is_leaf: self.is_leaf.into_boxed_slice(),
            leaf_values: self.leaf_values.into_boxed_slice(),
        }
    }
}
