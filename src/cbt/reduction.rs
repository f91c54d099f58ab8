//! Sum-reduction schedule.
//!
//! The reduction runs as one prepass over the bitfield followed by one
//! dispatch per remaining level, deep to shallow. The prepass folds the
//! bottom five levels per thread with popcounts; on hardware with subgroup
//! support a wider variant additionally folds five levels through subgroup
//! shuffles and three through workgroup memory, thirteen in total.

pub const SUM_REDUCTION_WORKGROUP_SIZE: u32 = 256;

/// Which prepass kernel the reduction uses. Decided once at startup from
/// the adapter features and never changed afterwards.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum ReductionStrategy {
    #[default]
    SwarOnly,
    SubgroupAccelerated,
}

impl ReductionStrategy {
    pub fn prepass_levels(self, max_depth: u32) -> u32 {
        let levels = match self {
            ReductionStrategy::SwarOnly => 5,
            ReductionStrategy::SubgroupAccelerated => 13,
        };

        levels.min(max_depth)
    }
}

/// One full-level dispatch of the reduction.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct ReductionPass {
    pub depth: u32,
    pub workgroups: u32,
}

fn level_workgroups(node_count: u32) -> u32 {
    u32::max(1, node_count / SUM_REDUCTION_WORKGROUP_SIZE)
}

/// Workgroups of the prepass: one thread per 32-bit bitfield word.
pub fn prepass_workgroups(max_depth: u32) -> u32 {
    level_workgroups(1 << (max_depth - 5))
}

/// The level dispatches following the prepass, deepest first. Each pass
/// must observe the previous one's writes before it runs.
pub fn level_passes(max_depth: u32, strategy: ReductionStrategy) -> Vec<ReductionPass> {
    let remaining = max_depth - strategy.prepass_levels(max_depth);

    (0..remaining)
        .rev()
        .map(|depth| ReductionPass {
            depth,
            workgroups: level_workgroups(1 << depth),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepass_covers_the_bottom_levels() {
        assert_eq!(ReductionStrategy::SwarOnly.prepass_levels(20), 5);
        assert_eq!(ReductionStrategy::SubgroupAccelerated.prepass_levels(20), 13);
        // Shallow trees clamp the wide prepass.
        assert_eq!(ReductionStrategy::SubgroupAccelerated.prepass_levels(10), 10);
    }

    #[test]
    fn level_passes_run_deep_to_shallow_down_to_the_root() {
        let passes = level_passes(20, ReductionStrategy::SwarOnly);

        assert_eq!(passes.first().unwrap().depth, 14);
        assert_eq!(passes.last().unwrap().depth, 0);
        for pair in passes.windows(2) {
            assert_eq!(pair[0].depth, pair[1].depth + 1);
        }
    }

    #[test]
    fn workgroup_counts_never_drop_to_zero() {
        assert_eq!(prepass_workgroups(10), 1);
        assert_eq!(prepass_workgroups(20), 128);

        for pass in level_passes(20, ReductionStrategy::SubgroupAccelerated) {
            assert!(pass.workgroups >= 1);
            assert_eq!(pass.workgroups, u32::max(1, (1 << pass.depth) / 256));
        }
    }

    #[test]
    fn wide_prepass_on_a_shallow_tree_leaves_no_level_passes() {
        assert!(level_passes(10, ReductionStrategy::SubgroupAccelerated).is_empty());
        assert_eq!(level_passes(10, ReductionStrategy::SwarOnly).len(), 5);
    }
}
