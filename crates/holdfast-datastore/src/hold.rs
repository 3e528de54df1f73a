//! Generation hold lists.
//!
//! A hold is something the writer has released but a reader might still
//! see. Holds accumulate in a pending phase until the owner assigns them a
//! generation, and are handed back for freeing once the oldest generation
//! any reader uses has moved past theirs.

use std::collections::VecDeque;

use holdfast_core::Generation;

/// Two-phase list of holds keyed by generation.
///
/// Generations passed to [`assign_generation`](Self::assign_generation)
/// must never decrease; the tagged phase is then sorted by construction
/// and reclaim only looks at its front.
#[derive(Debug)]
pub struct GenerationHoldList<H> {
    pending: Vec<H>,
    tagged: VecDeque<(Generation, H)>,
}

impl<H> GenerationHoldList<H> {
    /// Create an empty hold list.
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            tagged: VecDeque::new(),
        }
    }

    /// Add a hold; it gets tagged at the next `assign_generation`.
    pub fn insert(&mut self, hold: H) {
        self.pending.push(hold);
    }

    /// Tag every pending hold with `current`.
    pub fn assign_generation(&mut self, current: Generation) {
        debug_assert!(
            self.tagged.back().is_none_or(|(g, _)| *g <= current),
            "hold generations must not decrease"
        );
        self.tagged
            .extend(self.pending.drain(..).map(|hold| (current, hold)));
    }

    /// Pop the oldest tagged hold if its generation is older than
    /// `oldest_used`.
    pub fn pop_reclaimable(&mut self, oldest_used: Generation) -> Option<H> {
        match self.tagged.front() {
            Some((g, _)) if *g < oldest_used => self.tagged.pop_front().map(|(_, hold)| hold),
            _ => None,
        }
    }

    /// Remove every hold, tagged or not, regardless of generation.
    pub fn drain_all(&mut self) -> impl Iterator<Item = H> + '_ {
        self.tagged
            .drain(..)
            .map(|(_, hold)| hold)
            .chain(self.pending.drain(..))
    }

    /// Number of holds not yet tagged.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Total number of holds.
    pub fn len(&self) -> usize {
        self.pending.len() + self.tagged.len()
    }

    /// Whether the list holds nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over every hold, tagged first.
    pub fn iter(&self) -> impl Iterator<Item = &H> {
        self.tagged
            .iter()
            .map(|(_, hold)| hold)
            .chain(self.pending.iter())
    }
}

impl<H> Default for GenerationHoldList<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reclaim<H>(list: &mut GenerationHoldList<H>, oldest: u64) -> Vec<H> {
        std::iter::from_fn(|| list.pop_reclaimable(Generation(oldest))).collect()
    }

    #[test]
    fn pending_holds_are_never_reclaimed() {
        let mut list = GenerationHoldList::new();
        list.insert(1);
        assert!(reclaim(&mut list, u64::MAX).is_empty());
        assert_eq!(list.pending_len(), 1);
    }

    #[test]
    fn reclaim_frees_only_older_generations() {
        let mut list = GenerationHoldList::new();
        list.insert(1);
        list.assign_generation(Generation(10));
        list.insert(2);
        list.assign_generation(Generation(20));

        assert!(reclaim(&mut list, 10).is_empty());
        assert_eq!(reclaim(&mut list, 11), vec![1]);
        assert!(reclaim(&mut list, 20).is_empty());
        assert_eq!(reclaim(&mut list, 21), vec![2]);
        assert!(list.is_empty());
    }

    #[test]
    fn one_generation_tags_all_pending() {
        let mut list = GenerationHoldList::new();
        list.insert(1);
        list.insert(2);
        list.insert(3);
        list.assign_generation(Generation(5));
        assert_eq!(list.pending_len(), 0);
        assert_eq!(reclaim(&mut list, 6), vec![1, 2, 3]);
    }

    #[test]
    fn drain_all_ignores_generations() {
        let mut list = GenerationHoldList::new();
        list.insert(1);
        list.assign_generation(Generation(3));
        list.insert(2);
        let drained: Vec<_> = list.drain_all().collect();
        assert_eq!(drained, vec![1, 2]);
        assert!(list.is_empty());
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn reclaims_exactly_the_older_holds(
                gens in prop::collection::vec(0u64..100, 1..40),
                oldest in 0u64..110,
            ) {
                let mut sorted = gens.clone();
                sorted.sort_unstable();
                let mut list = GenerationHoldList::new();
                for &g in &sorted {
                    list.insert(g);
                    list.assign_generation(Generation(g));
                }
                let freed = reclaim(&mut list, oldest);
                prop_assert!(freed.iter().all(|&g| g < oldest));
                prop_assert!(list.iter().all(|&g| g >= oldest));
                prop_assert_eq!(freed.len() + list.len(), sorted.len());
            }
        }
    }
}
