//! Spatial partitioning for repulsion.
//!
//! The occupied area is cut into square cells of the maximum repulsion
//! distance. Any two nodes closer than that distance sit in the same or in
//! adjacent cells, so repulsion only needs to visit a node's own region and
//! its up-to-eight neighbours instead of every other node.

use std::collections::HashMap;

use tensile_core::{Bounds, NodeKey, Position, Vec2};

/// Integer cell coordinates of a region.
pub type RegionKey = (i64, i64);

const NEIGHBOUR_OFFSETS: [(i64, i64); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// One bucket of the grid: the nodes inside a cell plus the occupied cells
/// around it.
#[derive(Debug, Clone)]
pub struct LayoutRegion<N> {
    key: RegionKey,
    points: Vec<(N, Position)>,
    adjacent: Vec<RegionKey>,
}

impl<N: NodeKey> LayoutRegion<N> {
    fn new(key: RegionKey) -> Self {
        Self {
            key,
            points: Vec::new(),
            adjacent: Vec::new(),
        }
    }

    pub fn key(&self) -> RegionKey {
        self.key
    }

    pub fn points(&self) -> &[(N, Position)] {
        &self.points
    }

    /// Keys of occupied neighbouring regions.
    pub fn adjacent(&self) -> &[RegionKey] {
        &self.adjacent
    }

    pub fn contains(&self, node: N) -> bool {
        self.points.iter().any(|(n, _)| *n == node)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Region grid over the current node positions. Rebuilt every iteration.
#[derive(Debug, Clone)]
pub struct RegionGrid<N> {
    cell_size: f64,
    origin: Vec2,
    regions: HashMap<RegionKey, LayoutRegion<N>>,
    membership: HashMap<N, RegionKey>,
}

impl<N: NodeKey> RegionGrid<N> {
    pub fn empty(cell_size: f64) -> Self {
        Self {
            cell_size,
            origin: Vec2::ZERO,
            regions: HashMap::new(),
            membership: HashMap::new(),
        }
    }

    /// Bucket `points` into cells of side `cell_size`, anchored at the minimum
    /// corner of their bounding box.
    pub fn build<I>(points: I, cell_size: f64) -> Self
    where
        I: IntoIterator<Item = (N, Position)>,
    {
        let points: Vec<(N, Position)> = points.into_iter().collect();
        let Some(bounds) = Bounds::of(points.iter().map(|(_, p)| *p)) else {
            return Self::empty(cell_size);
        };

        let mut grid = Self {
            cell_size,
            origin: bounds.min,
            regions: HashMap::new(),
            membership: HashMap::with_capacity(points.len()),
        };

        for (node, pos) in points {
            let key = grid.key_for(pos);
            grid.regions
                .entry(key)
                .or_insert_with(|| LayoutRegion::new(key))
                .points
                .push((node, pos));
            grid.membership.insert(node, key);
        }

        let keys: Vec<RegionKey> = grid.regions.keys().copied().collect();
        for key in keys {
            let adjacent: Vec<RegionKey> = NEIGHBOUR_OFFSETS
                .iter()
                .map(|(dx, dy)| (key.0 + dx, key.1 + dy))
                .filter(|k| grid.regions.contains_key(k))
                .collect();
            if let Some(region) = grid.regions.get_mut(&key) {
                region.adjacent = adjacent;
            }
        }

        grid
    }

    fn key_for(&self, pos: Position) -> RegionKey {
        let local = pos - self.origin;
        (
            (local.x / self.cell_size).floor() as i64,
            (local.y / self.cell_size).floor() as i64,
        )
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    pub fn region(&self, key: RegionKey) -> Option<&LayoutRegion<N>> {
        self.regions.get(&key)
    }

    /// The region a node was bucketed into.
    pub fn region_of(&self, node: N) -> Option<&LayoutRegion<N>> {
        self.membership.get(&node).and_then(|k| self.regions.get(k))
    }

    /// Every node in the same region as `node` or an adjacent one, `node`
    /// itself included.
    pub fn nearby(&self, node: N) -> impl Iterator<Item = (N, Position)> + '_ {
        let keys: Vec<RegionKey> = match self.region_of(node) {
            Some(region) => std::iter::once(region.key)
                .chain(region.adjacent.iter().copied())
                .collect(),
            None => Vec::new(),
        };
        keys.into_iter()
            .filter_map(move |k| self.regions.get(&k))
            .flat_map(|r| r.points.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> RegionGrid<u32> {
        RegionGrid::build(
            [
                (0, Vec2::new(0.0, 0.0)),
                (1, Vec2::new(5.0, 5.0)),
                (2, Vec2::new(15.0, 5.0)),
                (3, Vec2::new(45.0, 45.0)),
            ],
            10.0,
        )
    }

    #[test]
    fn empty_input_builds_empty_grid() {
        let grid: RegionGrid<u32> = RegionGrid::build(Vec::new(), 10.0);
        assert_eq!(grid.region_count(), 0);
        assert_eq!(grid.nearby(0).count(), 0);
    }

    #[test]
    fn buckets_by_cell() {
        let grid = grid();
        assert_eq!(grid.region_count(), 3);
        let home = grid.region_of(0).unwrap();
        assert_eq!(home.key(), (0, 0));
        assert!(home.contains(1));
        assert_eq!(home.len(), 2);
        assert_eq!(grid.region_of(2).unwrap().key(), (1, 0));
        assert_eq!(grid.region_of(3).unwrap().key(), (4, 4));
    }

    #[test]
    fn adjacency_only_links_occupied_neighbours() {
        let grid = grid();
        assert_eq!(grid.region((0, 0)).unwrap().adjacent(), &[(1, 0)]);
        assert_eq!(grid.region((1, 0)).unwrap().adjacent(), &[(0, 0)]);
        assert!(grid.region((4, 4)).unwrap().adjacent().is_empty());
    }

    #[test]
    fn nearby_spans_own_and_adjacent_regions() {
        let grid = grid();
        let mut near: Vec<u32> = grid.nearby(0).map(|(n, _)| n).collect();
        near.sort();
        assert_eq!(near, vec![0, 1, 2]);

        let far: Vec<u32> = grid.nearby(3).map(|(n, _)| n).collect();
        assert_eq!(far, vec![3]);
    }

    #[test]
    fn close_pairs_always_share_or_neighbour_a_cell() {
        // Points straddling a cell border are still found.
        let grid = RegionGrid::build(
            [(0u32, Vec2::new(9.9, 0.0)), (1, Vec2::new(10.1, 19.9)), (2, Vec2::new(0.0, 10.0))],
            10.0,
        );
        let near: Vec<u32> = grid.nearby(0).map(|(n, _)| n).collect();
        assert!(near.contains(&1));
        assert!(near.contains(&2));
    }
}
