//! Bounding volume hierarchy over collision primitives.
//!
//! Nodes live in a flat vector and are built top-down by median split of
//! the primitive centroids along the longest axis. Queries are lazy: they
//! return iterators that walk the tree with an explicit stack and are
//! consumed once.

use glam::DVec3;

use crate::core::mesh::Aabb;

/// Default number of primitives stored in a leaf.
pub const DEFAULT_LEAF_SIZE: usize = 4;

#[derive(Debug, Clone)]
enum BvhNode {
    Leaf { bbox: Aabb, start: usize, count: usize },
    Internal { bbox: Aabb, left: usize, right: usize },
}

impl BvhNode {
    fn bbox(&self) -> &Aabb {
        match self {
            BvhNode::Leaf { bbox, .. } | BvhNode::Internal { bbox, .. } => bbox,
        }
    }
}

/// Hierarchy of bounding boxes with a payload per primitive.
#[derive(Debug, Clone)]
pub struct Bvh<T> {
    nodes: Vec<BvhNode>,
    items: Vec<(Aabb, T)>,
    leaf_size: usize,
}

impl<T: Copy> Default for Bvh<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> Bvh<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_leaf_size(DEFAULT_LEAF_SIZE)
    }

    #[must_use]
    pub fn with_leaf_size(leaf_size: usize) -> Self {
        Self {
            nodes: Vec::new(),
            items: Vec::new(),
            leaf_size: leaf_size.max(1),
        }
    }

    /// Builds a hierarchy over `(bounds, payload)` pairs. Empty bounds are dropped.
    #[must_use]
    pub fn build(items: impl IntoIterator<Item = (Aabb, T)>) -> Self {
        let mut bvh = Self::new();
        bvh.rebuild(items);
        bvh
    }

    /// Rebuilds in place, reusing the node and item buffers.
    pub fn rebuild(&mut self, items: impl IntoIterator<Item = (Aabb, T)>) {
        self.nodes.clear();
        self.items.clear();
        self.items
            .extend(items.into_iter().filter(|(bbox, _)| !bbox.is_empty()));
        if !self.items.is_empty() {
            self.build_node(0, self.items.len());
        }
    }

    fn build_node(&mut self, start: usize, end: usize) -> usize {
        let mut bbox = Aabb::empty();
        let mut centroids = Aabb::empty();
        for (item_box, _) in &self.items[start..end] {
            bbox.merge(item_box);
            centroids.extend(item_box.center());
        }

        let index = self.nodes.len();
        let count = end - start;
        self.nodes.push(BvhNode::Leaf { bbox, start, count });
        if count <= self.leaf_size {
            return index;
        }

        let axis = centroids.longest_axis();
        let mid = start + count / 2;
        self.items[start..end].select_nth_unstable_by(mid - start, |a, b| {
            a.0.center()[axis].total_cmp(&b.0.center()[axis])
        });
        let left = self.build_node(start, mid);
        let right = self.build_node(mid, end);
        self.nodes[index] = BvhNode::Internal { bbox, left, right };
        index
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Bounds of everything in the hierarchy.
    #[must_use]
    pub fn bounds(&self) -> Aabb {
        self.nodes.first().map_or_else(Aabb::empty, |n| *n.bbox())
    }

    /// Payloads whose bounds overlap `region`.
    pub fn query_aabb(&self, region: Aabb) -> AabbQuery<'_, T> {
        AabbQuery {
            bvh: self,
            region,
            stack: self.root_stack(),
            leaf: 0..0,
        }
    }

    /// Payloads whose bounds the ray enters within `[0, max_t]`.
    /// `direction` need not be normalized; `max_t` is in its units.
    pub fn query_ray(&self, origin: DVec3, direction: DVec3, max_t: f64) -> RayQuery<'_, T> {
        RayQuery {
            bvh: self,
            origin,
            direction,
            max_t,
            stack: self.root_stack(),
            leaf: 0..0,
        }
    }

    fn root_stack(&self) -> Vec<usize> {
        if self.nodes.is_empty() {
            Vec::new()
        } else {
            vec![0]
        }
    }
}

/// Lazy region query. See [`Bvh::query_aabb`].
pub struct AabbQuery<'a, T> {
    bvh: &'a Bvh<T>,
    region: Aabb,
    stack: Vec<usize>,
    leaf: std::ops::Range<usize>,
}

impl<'a, T: Copy> Iterator for AabbQuery<'a, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let bvh = self.bvh;
        loop {
            for index in self.leaf.by_ref() {
                let (bbox, item) = &bvh.items[index];
                if bbox.intersects(&self.region) {
                    return Some(*item);
                }
            }
            let node = &bvh.nodes[self.stack.pop()?];
            if !node.bbox().intersects(&self.region) {
                continue;
            }
            match node {
                BvhNode::Leaf { start, count, .. } => self.leaf = *start..start + count,
                BvhNode::Internal { left, right, .. } => {
                    self.stack.push(*right);
                    self.stack.push(*left);
                }
            }
        }
    }
}

/// Lazy ray query. See [`Bvh::query_ray`].
pub struct RayQuery<'a, T> {
    bvh: &'a Bvh<T>,
    origin: DVec3,
    direction: DVec3,
    max_t: f64,
    stack: Vec<usize>,
    leaf: std::ops::Range<usize>,
}

impl<'a, T: Copy> Iterator for RayQuery<'a, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let bvh = self.bvh;
        loop {
            for index in self.leaf.by_ref() {
                let (bbox, item) = &bvh.items[index];
                if bbox
                    .ray_entry(self.origin, self.direction, self.max_t)
                    .is_some()
                {
                    return Some(*item);
                }
            }
            let node = &bvh.nodes[self.stack.pop()?];
            if node
                .bbox()
                .ray_entry(self.origin, self.direction, self.max_t)
                .is_none()
            {
                continue;
            }
            match node {
                BvhNode::Leaf { start, count, .. } => self.leaf = *start..start + count,
                BvhNode::Internal { left, right, .. } => {
                    self.stack.push(*right);
                    self.stack.push(*left);
                }
            }
        }
    }
}
