// Fixed-depth Merkle accumulator
//
// Level 0 holds the commitments in insertion order. Each level pairs nodes
// left to right; an odd trailing node is paired with itself. Once a level is
// down to a single node it is paired with the zero placeholder until the
// tree is `depth` levels tall, so every proof has exactly `depth` steps.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use tracing::debug;

use crate::crypto::{FieldHasher, PoseidonHasher};
use crate::primitives::{FieldElement, Result, TicketError};

pub const MAX_TREE_DEPTH: usize = 32;

/// Sibling path from a leaf to the root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    #[serde(rename = "pathElements")]
    pub path_elements: Vec<FieldElement>,
    /// 1 when the running node is the right operand at that level
    #[serde(rename = "pathIndices")]
    pub path_indices: Vec<u8>,
}

impl MerkleProof {
    pub fn depth(&self) -> usize {
        self.path_elements.len()
    }

    /// Leaf position encoded by the index bits
    pub fn leaf_index(&self) -> u64 {
        self.path_indices
            .iter()
            .enumerate()
            .fold(0u64, |acc, (level, bit)| acc | ((*bit as u64 & 1) << level))
    }
}

pub struct MerkleAccumulator<H: FieldHasher = PoseidonHasher> {
    depth: usize,
    leaves: Vec<FieldElement>,
    positions: HashMap<FieldElement, usize>,
    /// Levels of the last build, leaves first, root level last
    levels: Vec<Vec<FieldElement>>,
    root_history: HashSet<FieldElement>,
    _hasher: PhantomData<H>,
}

impl<H: FieldHasher> MerkleAccumulator<H> {
    pub fn new(depth: usize) -> Result<Self> {
        if depth == 0 || depth > MAX_TREE_DEPTH {
            return Err(TicketError::Config(format!(
                "tree depth must be between 1 and {}, got {}",
                MAX_TREE_DEPTH, depth
            )));
        }

        Ok(Self {
            depth,
            leaves: Vec::new(),
            positions: HashMap::new(),
            levels: Vec::new(),
            root_history: HashSet::new(),
            _hasher: PhantomData,
        })
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn capacity(&self) -> u64 {
        1u64 << self.depth
    }

    /// Append a commitment and return its leaf index. The tree is not
    /// rebuilt; call `build_tree` before deriving roots or proofs.
    pub fn add_leaf(&mut self, commitment: FieldElement) -> Result<usize> {
        if self.leaves.len() as u64 >= self.capacity() {
            return Err(TicketError::Validation(format!(
                "accumulator full ({} leaves)",
                self.capacity()
            )));
        }
        if self.positions.contains_key(&commitment) {
            return Err(TicketError::Validation(format!(
                "commitment {} already inserted",
                commitment
            )));
        }

        let index = self.leaves.len();
        self.leaves.push(commitment);
        self.positions.insert(commitment, index);
        Ok(index)
    }

    /// Recompute every level from the leaf sequence and return the new root
    pub fn build_tree(&mut self) -> Result<FieldElement> {
        if self.leaves.is_empty() {
            return Err(TicketError::Validation(
                "cannot build a tree without leaves".to_string(),
            ));
        }

        let placeholder = FieldElement::zero();
        let mut levels = Vec::with_capacity(self.depth + 1);
        let mut current = self.leaves.clone();

        for _ in 0..self.depth {
            let next: Vec<FieldElement> = if current.len() == 1 {
                vec![H::hash_pair(&current[0], &placeholder)]
            } else {
                current
                    .chunks(2)
                    .map(|pair| {
                        let right = pair.get(1).unwrap_or(&pair[0]);
                        H::hash_pair(&pair[0], right)
                    })
                    .collect()
            };
            levels.push(current);
            current = next;
        }

        let root = current[0];
        levels.push(current);
        self.levels = levels;
        self.root_history.insert(root);

        debug!("🌳 Rebuilt accumulator: {} leaves, root {}", self.leaves.len(), root);
        Ok(root)
    }

    /// Append and rebuild in one step
    pub fn insert(&mut self, commitment: FieldElement) -> Result<(usize, FieldElement)> {
        let index = self.add_leaf(commitment)?;
        let root = self.build_tree()?;
        Ok((index, root))
    }

    /// Root of the last build
    pub fn root(&self) -> Option<FieldElement> {
        self.levels.last().and_then(|level| level.first()).copied()
    }

    /// Whether `root` was published by any build since the last `clear`
    pub fn is_known_root(&self, root: &FieldElement) -> bool {
        self.root_history.contains(root)
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    pub fn contains(&self, commitment: &FieldElement) -> bool {
        self.positions.contains_key(commitment)
    }

    pub fn leaf_index(&self, commitment: &FieldElement) -> Option<usize> {
        self.positions.get(commitment).copied()
    }

    pub fn leaf(&self, index: usize) -> Option<FieldElement> {
        self.leaves.get(index).copied()
    }

    /// Depth-`D` sibling path for a leaf covered by the last build
    pub fn get_proof(&self, leaf_index: usize) -> Result<MerkleProof> {
        let built_leaves = self.levels.first().map(Vec::len).unwrap_or(0);
        if leaf_index >= built_leaves {
            return Err(TicketError::NotFound(format!(
                "leaf {} not in built tree ({} leaves)",
                leaf_index, built_leaves
            )));
        }

        let mut path_elements = Vec::with_capacity(self.depth);
        let mut path_indices = Vec::with_capacity(self.depth);
        let mut index = leaf_index;

        for level in &self.levels[..self.depth] {
            if level.len() == 1 {
                path_elements.push(FieldElement::zero());
                path_indices.push(0);
            } else {
                let sibling = level.get(index ^ 1).unwrap_or(&level[index]);
                path_elements.push(*sibling);
                path_indices.push((index & 1) as u8);
            }
            index /= 2;
        }

        Ok(MerkleProof { path_elements, path_indices })
    }

    /// Replay a proof from `leaf` and compare with `root`
    pub fn verify_proof(
        leaf: &FieldElement,
        path_elements: &[FieldElement],
        path_indices: &[u8],
        root: &FieldElement,
    ) -> bool {
        if path_elements.len() != path_indices.len() {
            return false;
        }

        let mut acc = *leaf;
        for (sibling, is_right) in path_elements.iter().zip(path_indices) {
            acc = match is_right {
                0 => H::hash_pair(&acc, sibling),
                1 => H::hash_pair(sibling, &acc),
                _ => return false,
            };
        }

        acc == *root
    }

    /// `verify_proof` plus a check that the proof has this tree's depth
    pub fn verify(&self, leaf: &FieldElement, proof: &MerkleProof, root: &FieldElement) -> bool {
        proof.depth() == self.depth
            && Self::verify_proof(leaf, &proof.path_elements, &proof.path_indices, root)
    }

    /// Drop all leaves, levels and root history
    pub fn clear(&mut self) {
        self.leaves.clear();
        self.positions.clear();
        self.levels.clear();
        self.root_history.clear();
    }
}
