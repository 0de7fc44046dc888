//! Three dimensional k-d tree with nearest-point lookup.
//!
//! Built once by median splitting (`select_nth_unstable_by`) and never
//! modified. Equidistant candidates resolve to the point inserted first.

/// One tree node; `item` indexes the point list the tree was built from.
#[derive(Debug, Clone, Copy)]
struct KdNode {
    item: usize,
    axis: usize,
    left: Option<usize>,
    right: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct KdTree {
    points: Vec<[f64; 3]>,
    nodes: Vec<KdNode>,
    root: Option<usize>,
}

fn distance_squared(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    dx * dx + dy * dy + dz * dz
}

impl KdTree {
    pub fn build(points: Vec<[f64; 3]>) -> Self {
        let mut tree = KdTree {
            nodes: Vec::with_capacity(points.len()),
            root: None,
            points,
        };
        let mut indices: Vec<usize> = (0..tree.points.len()).collect();
        tree.root = tree.build_recursive(&mut indices, 0);
        tree
    }

    fn build_recursive(&mut self, indices: &mut [usize], depth: usize) -> Option<usize> {
        if indices.is_empty() {
            return None;
        }

        let axis = depth % 3;
        let mid = indices.len() / 2;
        let points = &self.points;
        indices.select_nth_unstable_by(mid, |&a, &b| {
            points[a][axis].total_cmp(&points[b][axis]).then(a.cmp(&b))
        });

        let slot = self.nodes.len();
        self.nodes.push(KdNode {
            item: indices[mid],
            axis,
            left: None,
            right: None,
        });

        let (left, rest) = indices.split_at_mut(mid);
        let left = self.build_recursive(left, depth + 1);
        let right = self.build_recursive(&mut rest[1..], depth + 1);
        self.nodes[slot].left = left;
        self.nodes[slot].right = right;
        Some(slot)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Index of the point closest to `query`, or `None` for an empty tree.
    pub fn nearest(&self, query: &[f64; 3]) -> Option<usize> {
        let mut best = None;
        if let Some(root) = self.root {
            self.search(root, query, &mut best);
        }
        best.map(|(_, item)| item)
    }

    fn search(&self, slot: usize, query: &[f64; 3], best: &mut Option<(f64, usize)>) {
        let node = self.nodes[slot];
        let point = &self.points[node.item];
        let distance = distance_squared(point, query);
        let improves = match *best {
            None => true,
            Some((best_distance, best_item)) => {
                distance < best_distance || (distance == best_distance && node.item < best_item)
            }
        };
        if improves {
            *best = Some((distance, node.item));
        }

        let diff = query[node.axis] - point[node.axis];
        let (near, far) = if diff < 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };
        if let Some(near) = near {
            self.search(near, query, best);
        }
        if let Some(far) = far {
            // equal distances across the plane still compete on insertion order
            if best.is_none_or(|(best_distance, _)| diff * diff <= best_distance) {
                self.search(far, query, best);
            }
        }
    }
}
