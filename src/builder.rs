use std::{ops::Range, time::Instant};

use assert2::assert;
use index_vec::IndexVec;
use itertools::Itertools as _;

use crate::{
    binning::evaluate_split,
    geometry::WorldBox,
    parallel::{ParallelBinner, TaskPool},
    primitives::{BuildRecord, PrimInfo, PrimRef},
    settings::BuildSettings,
    util::Stats,
};

index_vec::define_index_type! {
    pub struct NodeIdx = u32;
}

#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Inner {
        bounds: WorldBox,
        children: [NodeIdx; 2],
    },
    Leaf {
        bounds: WorldBox,
        range: Range<usize>,
    },
}

impl Node {
    pub fn bounds(&self) -> &WorldBox {
        match self {
            Node::Inner { bounds, .. } | Node::Leaf { bounds, .. } => bounds,
        }
    }
}

/// Binary BVH over an array of primitive references.
/// Leaves reference ranges of the reordered primitive array.
#[derive(Clone, Debug)]
pub struct Bvh {
    nodes: IndexVec<NodeIdx, Node>,
    prims: Vec<PrimRef>,
    root: NodeIdx,
    fallback_splits: usize,
    parallel_steps: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BvhStatistics {
    pub depth: Stats,
    pub leaf_size: Stats,
    pub inner_nodes: usize,
    pub leaves: usize,
}

struct BuildContext<'a> {
    settings: &'a BuildSettings,
    pool: TaskPool,
    binner: ParallelBinner,
    scratch: Vec<PrimRef>,
}

impl Bvh {
    pub fn build(prims: Vec<PrimRef>, settings: &BuildSettings) -> Bvh {
        let start = Instant::now();
        let info = PrimInfo::from_prims(&prims);

        let mut ctx = BuildContext {
            settings,
            pool: settings.task_pool(),
            binner: ParallelBinner::new(settings.max_tasks),
            scratch: if prims.len() >= settings.parallel_threshold {
                prims.clone()
            } else {
                Vec::new()
            },
        };

        let mut bvh = Bvh {
            nodes: IndexVec::new(),
            prims,
            root: NodeIdx::new(0),
            fallback_splits: 0,
            parallel_steps: 0,
        };
        bvh.root = bvh.build_recursive(&mut ctx, BuildRecord::from(info));

        log::info!(
            "Built BVH over {} primitives in {:.1?}: {} nodes, {} fallback splits, {} parallel steps",
            bvh.prims.len(),
            start.elapsed(),
            bvh.nodes.len(),
            bvh.fallback_splits,
            bvh.parallel_steps
        );

        bvh
    }

    fn build_recursive(&mut self, ctx: &mut BuildContext<'_>, record: BuildRecord) -> NodeIdx {
        if record.len() <= ctx.settings.max_leaf_size {
            return self.nodes.push(Node::Leaf {
                bounds: record.bounds.geometry,
                range: record.range(),
            });
        }

        let (left, right) = self.split(ctx, &record);
        let left = self.build_recursive(ctx, left);
        let right = self.build_recursive(ctx, right);

        self.nodes.push(Node::Inner {
            bounds: record.bounds.geometry,
            children: [left, right],
        })
    }

    /// Splits the record into two non-empty halves.
    fn split(
        &mut self,
        ctx: &mut BuildContext<'_>,
        record: &BuildRecord,
    ) -> (BuildRecord, BuildRecord) {
        let info = record.prim_info();
        let lbs = ctx.settings.log_block_size;

        let sides = if record.len() >= ctx.settings.parallel_threshold {
            self.parallel_steps += 1;
            let split = ctx.binner.find(&ctx.pool, &self.prims, &info, lbs);
            split.is_valid().then(|| {
                let sides = ctx.binner.partition(&ctx.pool, &self.prims, &mut ctx.scratch);
                self.prims[record.range()].copy_from_slice(&ctx.scratch[record.range()]);
                sides
            })
        } else {
            let split = evaluate_split(&self.prims, &info, lbs);
            split
                .is_valid()
                .then(|| split.partition(&mut self.prims, record.begin, record.end))
        };

        match sides {
            Some((left, right)) if !left.is_empty() && !right.is_empty() => (left, right),
            _ => {
                self.fallback_splits += 1;
                median_split(&mut self.prims, record)
            }
        }
    }

    pub fn root(&self) -> NodeIdx {
        self.root
    }

    pub fn node(&self, idx: NodeIdx) -> &Node {
        &self.nodes[idx]
    }

    pub fn nodes(&self) -> &IndexVec<NodeIdx, Node> {
        &self.nodes
    }

    pub fn prims(&self) -> &[PrimRef] {
        &self.prims
    }

    pub fn bounds(&self) -> &WorldBox {
        self.nodes[self.root].bounds()
    }

    pub fn fallback_splits(&self) -> usize {
        self.fallback_splits
    }

    pub fn parallel_steps(&self) -> usize {
        self.parallel_steps
    }

    /// Bounds and primitives of every leaf.
    pub fn leaves(&self) -> impl Iterator<Item = (&WorldBox, &[PrimRef])> {
        self.nodes.iter().filter_map(|node| match node {
            Node::Leaf { bounds, range } => Some((bounds, &self.prims[range.clone()])),
            Node::Inner { .. } => None,
        })
    }

    pub fn statistics(&self) -> BvhStatistics {
        let leaf_size: Stats = self.leaves().map(|(_, prims)| prims.len()).collect();
        let leaves = leaf_size.count;

        BvhStatistics {
            depth: self.depth_samples(self.root).into_iter().collect(),
            leaf_size,
            inner_nodes: self.nodes.len() - leaves,
            leaves,
        }
    }

    /// Depth of every leaf below `node`, counting `node` itself as 1.
    fn depth_samples(&self, node: NodeIdx) -> Vec<usize> {
        match &self.nodes[node] {
            Node::Leaf { .. } => vec![1],
            Node::Inner { children, .. } => children
                .iter()
                .flat_map(|child| self.depth_samples(*child))
                .map(|depth| depth + 1)
                .collect(),
        }
    }

    /// Panics unless every primitive sits in exactly one leaf inside that leaf's bounds
    /// and every child is inside its parent.
    pub fn validate(&self) {
        let mut ranges = Vec::new();
        self.validate_recursive(self.root, &mut ranges);

        ranges.sort_by_key(|r| r.start);
        let mut expected_start = 0;
        for range in ranges {
            assert!(range.start == expected_start, "Leaf ranges must tile the primitive array");
            expected_start = range.end;
        }
        assert!(expected_start == self.prims.len());

        let ids = self.prims.iter().map(|p| (p.geom_id, p.prim_id)).sorted().collect_vec();
        assert!(ids.iter().tuple_windows().all(|(a, b)| a != b), "Duplicate primitive");
    }

    fn validate_recursive(&self, node: NodeIdx, ranges: &mut Vec<Range<usize>>) {
        match &self.nodes[node] {
            Node::Leaf { bounds, range } => {
                for prim in &self.prims[range.clone()] {
                    assert!(bounds.contains(&prim.bounds));
                }
                ranges.push(range.clone());
            }
            Node::Inner { bounds, children } => {
                for child in children {
                    assert!(bounds.contains(self.nodes[*child].bounds()));
                    self.validate_recursive(*child, ranges);
                }
            }
        }
    }
}

/// Splits the record at the median centroid along its largest centroid axis.
fn median_split(prims: &mut [PrimRef], record: &BuildRecord) -> (BuildRecord, BuildRecord) {
    let axis = record.bounds.centroid2.largest_axis();
    let mid = record.begin + record.len() / 2;

    log::debug!(
        "No valid SAH split for {} primitives, median split along axis {}",
        record.len(),
        axis
    );

    prims[record.range()].select_nth_unstable_by(mid - record.begin, |a, b| {
        a.center2()[axis].total_cmp(&b.center2()[axis])
    });

    (
        PrimInfo::from_range(prims, record.begin, mid).into(),
        PrimInfo::from_range(prims, mid, record.end).into(),
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        geometry::WorldPoint,
        parallel::WorkerCount,
        scene::{random_boxes, unit_box_at},
    };

    use std::num::NonZeroUsize;

    use assert2::{assert, let_assert};
    use test_case::test_case;

    fn leaf_sets(bvh: &Bvh) -> Vec<Vec<u32>> {
        bvh.leaves()
            .map(|(_, prims)| prims.iter().map(|p| p.prim_id).sorted().collect_vec())
            .sorted()
            .collect_vec()
    }

    fn settings(parallel_threshold: usize, workers: usize) -> BuildSettings {
        let_assert!(
            Ok(settings) = BuildSettings::builder()
                .parallel_threshold(parallel_threshold)
                .worker_count(WorkerCount::Manual(NonZeroUsize::new(workers).unwrap()))
                .build()
        );
        settings
    }

    #[test_case(1; "single primitive")]
    #[test_case(4; "single leaf")]
    #[test_case(1000; "serial")]
    fn serial_build_is_valid(count: usize) {
        let bvh = Bvh::build(random_boxes(count, 1.0, 5), &settings(usize::MAX, 1));
        bvh.validate();

        let stats = bvh.statistics();
        assert!(stats.leaf_size.max <= 4);
        assert!(stats.leaves + stats.inner_nodes == bvh.nodes().len());
        assert!(stats.leaves == stats.inner_nodes + 1);
        assert!(bvh.parallel_steps() == 0);
        assert!(bvh.prims().len() == count);
    }

    #[test]
    fn empty_build() {
        let bvh = Bvh::build(Vec::new(), &BuildSettings::default());
        bvh.validate();
        let_assert!(Node::Leaf { range, .. } = bvh.node(bvh.root()));
        assert!(range.is_empty());
        assert!(bvh.bounds().is_empty());
    }

    #[test]
    fn parallel_build_matches_serial() {
        let prims = random_boxes(20_000, 1.0, 17);
        let serial = Bvh::build(prims.clone(), &settings(usize::MAX, 1));
        let parallel = Bvh::build(prims, &settings(256, 4));

        parallel.validate();
        assert!(parallel.parallel_steps() > 0);
        assert!(parallel.nodes().len() == serial.nodes().len());
        assert!(parallel.bounds() == serial.bounds());
        assert!(leaf_sets(&parallel) == leaf_sets(&serial));
    }

    #[test]
    fn identical_boxes_use_median_fallback() {
        let prims = (0..100)
            .map(|i| unit_box_at(WorldPoint::new(1.0, 2.0, 3.0), i))
            .collect_vec();
        let bvh = Bvh::build(prims, &BuildSettings::default());
        bvh.validate();

        assert!(bvh.fallback_splits() > 0);
        let stats = bvh.statistics();
        assert!(stats.leaf_size.max <= 4);
        // Median splits keep the tree balanced
        assert!(stats.depth.max - stats.depth.min <= 1);
    }

    #[test]
    fn median_split_halves_the_range() {
        let mut prims = (0..10)
            .rev()
            .map(|i| unit_box_at(WorldPoint::new(0.0, i as f32, 0.0), i))
            .collect_vec();
        let record = BuildRecord::from(PrimInfo::from_prims(&prims));

        let (left, right) = median_split(&mut prims, &record);
        assert!(left.len() == 5);
        assert!(right.len() == 5);
        assert!(prims[left.range()].iter().all(|p| p.prim_id < 5));
        assert!(left.bounds.geometry.max.y <= right.bounds.geometry.min.y + 1.0);
    }

    #[test]
    fn inner_nodes_contain_children() {
        let bvh = Bvh::build(random_boxes(500, 5.0, 2), &BuildSettings::default());
        for node in bvh.nodes() {
            if let Node::Inner { bounds, children } = node {
                for child in children {
                    assert!(bounds.contains(bvh.node(*child).bounds()));
                }
            }
        }
        assert!(bvh.statistics().depth.min >= 2);
    }
}
