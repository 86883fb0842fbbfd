// Append-only Merkle accumulator over ticket commitments
pub mod accumulator;

pub use accumulator::{MerkleAccumulator, MerkleProof, MAX_TREE_DEPTH};
