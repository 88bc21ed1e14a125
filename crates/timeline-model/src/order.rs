//! Segment order: which loaded clip plays in which timeline slot.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A permutation of video asset indices `0..n`.
///
/// The order only lives for the current session; it is rebuilt whenever the
/// set of video assets changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    indices: Vec<usize>,
}

impl Order {
    /// Identity permutation over `n` assets.
    pub fn initialize(n: usize) -> Self {
        Self {
            indices: (0..n).collect(),
        }
    }

    /// Use an explicit permutation, rejecting anything that is not a
    /// bijection on `0..len`.
    pub fn from_permutation(indices: Vec<usize>) -> Option<Self> {
        let mut seen = vec![false; indices.len()];
        for &index in &indices {
            let slot = seen.get_mut(index)?;
            if *slot {
                return None;
            }
            *slot = true;
        }
        Some(Self { indices })
    }

    /// Reset to the identity permutation over `n` assets.
    pub fn reset(&mut self, n: usize) {
        self.indices = (0..n).collect();
    }

    /// Uniformly shuffle the order using the thread-local RNG.
    pub fn shuffle(&mut self) {
        self.shuffle_with(&mut rand::thread_rng());
    }

    /// Uniformly shuffle the order with a caller-supplied RNG
    /// (single-pass Fisher–Yates).
    pub fn shuffle_with<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.indices.shuffle(rng);
    }

    /// Asset indices in play order.
    pub fn as_slice(&self) -> &[usize] {
        &self.indices
    }

    /// Asset index for a timeline slot.
    pub fn get(&self, slot: usize) -> Option<usize> {
        self.indices.get(slot).copied()
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Whether no assets are loaded.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn is_permutation(order: &Order, n: usize) -> bool {
        let mut sorted = order.as_slice().to_vec();
        sorted.sort_unstable();
        sorted == (0..n).collect::<Vec<_>>()
    }

    #[test]
    fn test_initialize_is_identity() {
        assert_eq!(Order::initialize(5).as_slice(), &[0, 1, 2, 3, 4]);
        assert!(Order::initialize(0).is_empty());
    }

    #[test]
    fn test_repeated_shuffles_keep_the_index_set() {
        let mut order = Order::initialize(5);
        for _ in 0..200 {
            order.shuffle();
            assert_eq!(order.len(), 5);
            assert!(is_permutation(&order, 5));
        }
    }

    #[test]
    fn test_seeded_shuffle_is_reproducible() {
        let mut a = Order::initialize(8);
        let mut b = Order::initialize(8);
        a.shuffle_with(&mut StdRng::seed_from_u64(42));
        b.shuffle_with(&mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_shuffle_reaches_every_first_slot() {
        // A uniform shuffle puts each index first roughly 1/n of the time.
        let mut rng = StdRng::seed_from_u64(7);
        let mut first_counts = [0usize; 4];
        for _ in 0..4000 {
            let mut order = Order::initialize(4);
            order.shuffle_with(&mut rng);
            first_counts[order.as_slice()[0]] += 1;
        }
        for count in first_counts {
            assert!((800..1200).contains(&count), "skewed count {count}");
        }
    }

    #[test]
    fn test_from_permutation_validates() {
        assert_eq!(
            Order::from_permutation(vec![2, 0, 1]).map(|o| o.as_slice().to_vec()),
            Some(vec![2, 0, 1])
        );
        assert!(Order::from_permutation(vec![0, 0, 1]).is_none());
        assert!(Order::from_permutation(vec![0, 3]).is_none());
        assert!(Order::from_permutation(Vec::new()).is_some());
    }

    #[test]
    fn test_reset_rebuilds_identity() {
        let mut order = Order::initialize(3);
        order.shuffle_with(&mut StdRng::seed_from_u64(1));
        order.reset(4);
        assert_eq!(order.as_slice(), &[0, 1, 2, 3]);
        assert_eq!(order.get(3), Some(3));
        assert_eq!(order.get(4), None);
    }

    proptest! {
        #[test]
        fn prop_shuffle_is_bijection(n in 0usize..64, seed in any::<u64>(), rounds in 1usize..5) {
            let mut order = Order::initialize(n);
            let mut rng = StdRng::seed_from_u64(seed);
            for _ in 0..rounds {
                order.shuffle_with(&mut rng);
            }
            prop_assert_eq!(order.len(), n);
            prop_assert!(is_permutation(&order, n));
        }
    }
}
