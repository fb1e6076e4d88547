// Order-preserving binary hash tree over leaf hashes.
//
// Used for the payload transactions root and the shard commitments root.
// Parent nodes are hash(left || right); an odd node at any level is paired
// with itself. A single leaf is likewise paired with itself so that the
// root of [x] differs from x.

use crate::crypto::{hash, Hash};

/// Calculate the tree root from a list of leaf hashes.
///
/// An empty list yields the all-zero root.
pub fn calculate_root(leaves: &[Hash]) -> Hash {
    if leaves.is_empty() {
        return Hash::zero();
    }

    let mut hashes: Vec<Hash> = leaves.to_vec();

    if hashes.len() == 1 {
        return hash_pair(&hashes[0], &hashes[0]);
    }

    while hashes.len() > 1 {
        let mut next_level = Vec::new();

        for chunk in hashes.chunks(2) {
            let left = &chunk[0];
            let right = if chunk.len() == 2 {
                &chunk[1]
            } else {
                // Odd number: pair with itself
                &chunk[0]
            };

            next_level.push(hash_pair(left, right));
        }

        hashes = next_level;
    }

    hashes[0].clone()
}

/// Compute the inclusion branch for the leaf at `index`.
///
/// The branch lists the sibling hash at every level, bottom-up. Returns
/// `None` if `index` is out of range.
pub fn calculate_branch(leaves: &[Hash], index: usize) -> Option<Vec<Hash>> {
    if index >= leaves.len() {
        return None;
    }

    let mut branch = Vec::new();
    let mut hashes: Vec<Hash> = leaves.to_vec();
    let mut position = index;

    if hashes.len() == 1 {
        // Single leaf pairs with itself
        return Some(vec![hashes[0].clone()]);
    }

    while hashes.len() > 1 {
        let sibling = if position % 2 == 0 {
            // Right sibling, or self when the level has an odd tail
            hashes.get(position + 1).unwrap_or(&hashes[position])
        } else {
            &hashes[position - 1]
        };
        branch.push(sibling.clone());

        let mut next_level = Vec::new();
        for chunk in hashes.chunks(2) {
            let left = &chunk[0];
            let right = if chunk.len() == 2 { &chunk[1] } else { &chunk[0] };
            next_level.push(hash_pair(left, right));
        }

        hashes = next_level;
        position /= 2;
    }

    Some(branch)
}

/// Verify an inclusion branch: fold `leaf` up through `branch` and compare
/// the result against `root`. `index` selects left/right at each level.
pub fn verify_branch(leaf: &Hash, index: usize, branch: &[Hash], root: &Hash) -> bool {
    let mut current = leaf.clone();
    let mut position = index;

    for sibling in branch {
        current = if position % 2 == 0 {
            hash_pair(&current, sibling)
        } else {
            hash_pair(sibling, &current)
        };
        position /= 2;
    }

    current == *root
}

/// Hash a pair of hashes
fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut bytes = Vec::with_capacity(64);
    bytes.extend_from_slice(left.as_bytes());
    bytes.extend_from_slice(right.as_bytes());
    hash(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(tag: u8) -> Hash {
        hash(&[tag])
    }

    #[test]
    fn test_empty_root() {
        assert_eq!(calculate_root(&[]), Hash::zero());
    }

    #[test]
    fn test_single_leaf() {
        let l = leaf(1);
        let root = calculate_root(std::slice::from_ref(&l));
        // Single leaf pairs with itself
        assert_eq!(root, hash_pair(&l, &l));
        assert_ne!(root, l);
    }

    #[test]
    fn test_two_leaves() {
        let (a, b) = (leaf(1), leaf(2));
        assert_eq!(calculate_root(&[a.clone(), b.clone()]), hash_pair(&a, &b));
    }

    #[test]
    fn test_three_leaves() {
        let (a, b, c) = (leaf(1), leaf(2), leaf(3));

        // Level 0: [a, b, c]
        // Level 1: [hash(a||b), hash(c||c)]
        // Level 2: hash(hash(a||b) || hash(c||c))
        let h01 = hash_pair(&a, &b);
        let h22 = hash_pair(&c, &c);
        let expected = hash_pair(&h01, &h22);

        assert_eq!(calculate_root(&[a, b, c]), expected);
    }

    #[test]
    fn test_root_is_order_sensitive() {
        let (a, b) = (leaf(1), leaf(2));
        assert_ne!(
            calculate_root(&[a.clone(), b.clone()]),
            calculate_root(&[b, a])
        );
    }

    #[test]
    fn test_branch_verifies_for_every_leaf() {
        for count in 1..=9usize {
            let leaves: Vec<Hash> = (0..count as u8).map(leaf).collect();
            let root = calculate_root(&leaves);

            for (index, l) in leaves.iter().enumerate() {
                let branch = calculate_branch(&leaves, index).unwrap();
                assert!(
                    verify_branch(l, index, &branch, &root),
                    "branch for leaf {} of {} failed",
                    index,
                    count
                );
            }
        }
    }

    #[test]
    fn test_branch_rejects_wrong_leaf() {
        let leaves: Vec<Hash> = (0..4u8).map(leaf).collect();
        let root = calculate_root(&leaves);
        let branch = calculate_branch(&leaves, 2).unwrap();

        assert!(!verify_branch(&leaf(9), 2, &branch, &root));
    }

    #[test]
    fn test_branch_rejects_wrong_index() {
        let leaves: Vec<Hash> = (0..4u8).map(leaf).collect();
        let root = calculate_root(&leaves);
        let branch = calculate_branch(&leaves, 2).unwrap();

        assert!(!verify_branch(&leaves[2], 3, &branch, &root));
    }

    #[test]
    fn test_branch_out_of_range() {
        let leaves: Vec<Hash> = (0..4u8).map(leaf).collect();
        assert!(calculate_branch(&leaves, 4).is_none());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn every_branch_verifies(tags in proptest::collection::vec(any::<u8>(), 1..24)) {
                let leaves: Vec<Hash> = tags.iter().map(|t| hash(&[*t])).collect();
                let root = calculate_root(&leaves);

                for (index, l) in leaves.iter().enumerate() {
                    let branch = calculate_branch(&leaves, index).unwrap();
                    prop_assert!(verify_branch(l, index, &branch, &root));
                }
            }

            #[test]
            fn root_changes_with_any_leaf(tags in proptest::collection::vec(any::<u8>(), 1..12)) {
                let leaves: Vec<Hash> = tags.iter().map(|t| hash(&[*t])).collect();
                let root = calculate_root(&leaves);

                for index in 0..leaves.len() {
                    let mut tampered = leaves.clone();
                    tampered[index] = hash(&[tags[index], 0xff]);
                    prop_assert_ne!(calculate_root(&tampered), root.clone());
                }
            }
        }
    }
}
