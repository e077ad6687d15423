//! Host-side k-d tree construction over scene primitives.
//!
//! Produces the flat node array the traversal kernel consumes: interior
//! nodes carry an axis and split position with two child indices, leaves
//! reference a range of the primitive permutation. Sphere and cube
//! instances are one primitive each; mesh instances contribute one
//! primitive per triangle. Primitives straddling a split plane are
//! referenced from both children, which is what makes interval-clipped
//! traversal exact.

use glam::Vec3;

use crate::scene::{GeomKind, Scene};

use super::constants::{KD_LEAF_SIZE, KD_MAX_DEPTH, NONE_U32};

const LEAF_FLAG: u32 = 4;

/// Axis-aligned bounds used during construction.
#[derive(Debug, Copy, Clone)]
pub(crate) struct Aabb {
    pub(crate) min: Vec3,
    pub(crate) max: Vec3,
}

impl Aabb {
    pub(crate) fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    pub(crate) fn include_point(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    pub(crate) fn include(&mut self, other: &Aabb) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    pub(crate) fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }
}

/// One k-d primitive: a whole sphere/cube instance, or a single triangle of
/// a mesh instance.
#[derive(Debug, Copy, Clone)]
pub(crate) struct KdPrimitive {
    pub(crate) geom: u32,
    pub(crate) tri: u32,
    pub(crate) bounds: Aabb,
}

/// Flat k-d tree ready for device upload.
#[derive(Debug, Default)]
pub(crate) struct KdTree {
    /// Packed nodes, 4 words each: [axis | leaf flag, left/start,
    /// right/count, pad].
    pub(crate) nodes: Vec<u32>,
    /// Split position per node (unused for leaves).
    pub(crate) splits: Vec<f32>,
    /// Primitive permutation: geom id per entry.
    pub(crate) prim_geoms: Vec<u32>,
    /// Primitive permutation: triangle index per entry (0 for non-meshes).
    pub(crate) prim_tris: Vec<u32>,
}

impl KdTree {
    pub(crate) fn node_count(&self) -> usize {
        self.splits.len()
    }
}

/// Expand the scene's instances into k-d primitives with world bounds.
pub(crate) fn collect_primitives(scene: &Scene) -> Vec<KdPrimitive> {
    let mut prims = Vec::new();
    for (geom_id, geom) in scene.geoms.iter().enumerate() {
        let transform = geom.transform();
        match geom.kind {
            GeomKind::Sphere | GeomKind::Cube => {
                // The unit cube bounds both object-space primitives.
                let mut bounds = Aabb::empty();
                for corner in 0..8 {
                    let p = Vec3::new(
                        if corner & 1 == 0 { -0.5 } else { 0.5 },
                        if corner & 2 == 0 { -0.5 } else { 0.5 },
                        if corner & 4 == 0 { -0.5 } else { 0.5 },
                    );
                    bounds.include_point(transform.transform_point3(p));
                }
                prims.push(KdPrimitive {
                    geom: geom_id as u32,
                    tri: 0,
                    bounds,
                });
            }
            GeomKind::Mesh {
                triangle_start,
                triangle_count,
            } => {
                for tri in triangle_start..triangle_start + triangle_count {
                    let idx = scene.mesh.indices[tri];
                    let mut bounds = Aabb::empty();
                    for &vi in &idx {
                        let p = scene.mesh.positions[vi as usize];
                        bounds.include_point(transform.transform_point3(p));
                    }
                    prims.push(KdPrimitive {
                        geom: geom_id as u32,
                        tri: tri as u32,
                        bounds,
                    });
                }
            }
        }
    }
    prims
}

/// Build the flat tree over the given primitives. An empty primitive list
/// produces an empty tree, which the traversal kernel treats as "walk the
/// instance list directly".
pub(crate) fn build_kd_tree(prims: &[KdPrimitive]) -> KdTree {
    let mut tree = KdTree::default();
    if prims.is_empty() {
        return tree;
    }
    let items: Vec<u32> = (0..prims.len() as u32).collect();
    build_node(&mut tree, prims, items, 0);
    tree
}

fn push_node(tree: &mut KdTree) -> usize {
    let node_index = tree.node_count();
    tree.nodes.extend_from_slice(&[0, NONE_U32, NONE_U32, 0]);
    tree.splits.push(0.0);
    node_index
}

fn make_leaf(tree: &mut KdTree, node_index: usize, prims: &[KdPrimitive], items: &[u32]) {
    let start = tree.prim_geoms.len() as u32;
    for &item in items {
        let prim = &prims[item as usize];
        tree.prim_geoms.push(prim.geom);
        tree.prim_tris.push(prim.tri);
    }
    let base = node_index * 4;
    tree.nodes[base] = LEAF_FLAG;
    tree.nodes[base + 1] = start;
    tree.nodes[base + 2] = items.len() as u32;
}

fn build_node(tree: &mut KdTree, prims: &[KdPrimitive], items: Vec<u32>, depth: usize) -> u32 {
    let node_index = push_node(tree);
    if items.len() <= KD_LEAF_SIZE || depth >= KD_MAX_DEPTH {
        make_leaf(tree, node_index, prims, &items);
        return node_index as u32;
    }

    // Split the largest centroid extent at the centroid median.
    let mut centroid_bounds = Aabb::empty();
    for &item in &items {
        centroid_bounds.include_point(prims[item as usize].bounds.center());
    }
    let extent = centroid_bounds.max - centroid_bounds.min;
    let axis = if extent.x >= extent.y && extent.x >= extent.z {
        0
    } else if extent.y >= extent.z {
        1
    } else {
        2
    };

    let mut centroids: Vec<f32> = items
        .iter()
        .map(|&item| prims[item as usize].bounds.center()[axis])
        .collect();
    centroids.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let split = centroids[centroids.len() / 2];

    let mut left = Vec::new();
    let mut right = Vec::new();
    for &item in &items {
        let bounds = &prims[item as usize].bounds;
        if bounds.min[axis] < split {
            left.push(item);
        }
        if bounds.max[axis] > split || bounds.min[axis] >= split {
            right.push(item);
        }
    }

    // A split that fails to separate anything would recurse forever.
    if left.is_empty() || right.is_empty() || left.len() == items.len() || right.len() == items.len()
    {
        make_leaf(tree, node_index, prims, &items);
        return node_index as u32;
    }

    let left_child = build_node(tree, prims, left, depth + 1);
    let right_child = build_node(tree, prims, right, depth + 1);
    let base = node_index * 4;
    tree.nodes[base] = axis as u32;
    tree.nodes[base + 1] = left_child;
    tree.nodes[base + 2] = right_child;
    tree.splits[node_index] = split;
    node_index as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Camera, Geom, GeomKind, Material, Scene};
    use glam::Vec3;

    fn scattered_spheres(count: usize) -> Scene {
        let camera = Camera::new((16, 16), Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO);
        let mut scene = Scene::new(camera);
        scene.materials.push(Material::diffuse(Vec3::ONE));
        for i in 0..count {
            let mut geom = Geom::new(GeomKind::Sphere, 0);
            let f = i as f32;
            geom.translation = Vec3::new(f * 2.0, (f * 7.0) % 5.0, (f * 3.0) % 11.0);
            scene.geoms.push(geom);
        }
        scene
    }

    fn leaf_ranges(tree: &KdTree) -> Vec<(u32, u32)> {
        let mut out = Vec::new();
        for node in 0..tree.node_count() {
            let base = node * 4;
            if tree.nodes[base] & LEAF_FLAG != 0 {
                out.push((tree.nodes[base + 1], tree.nodes[base + 2]));
            }
        }
        out
    }

    #[test]
    fn test_build_covers_every_primitive() {
        let scene = scattered_spheres(33);
        let prims = collect_primitives(&scene);
        let tree = build_kd_tree(&prims);

        assert!(tree.node_count() > 1);
        assert_eq!(tree.prim_geoms.len(), tree.prim_tris.len());

        let mut seen = vec![false; scene.geoms.len()];
        for (start, count) in leaf_ranges(&tree) {
            for i in start..start + count {
                seen[tree.prim_geoms[i as usize] as usize] = true;
            }
        }
        assert!(seen.iter().all(|&s| s), "every instance reachable from a leaf");
    }

    #[test]
    fn test_interior_children_are_valid() {
        let scene = scattered_spheres(40);
        let prims = collect_primitives(&scene);
        let tree = build_kd_tree(&prims);

        for node in 0..tree.node_count() {
            let base = node * 4;
            if tree.nodes[base] & LEAF_FLAG == 0 {
                let axis = tree.nodes[base];
                let left = tree.nodes[base + 1] as usize;
                let right = tree.nodes[base + 2] as usize;
                assert!(axis < 3);
                assert!(left < tree.node_count());
                assert!(right < tree.node_count());
                assert!(left > node && right > node, "children follow parents");
            } else {
                let start = tree.nodes[base + 1] as usize;
                let count = tree.nodes[base + 2] as usize;
                assert!(start + count <= tree.prim_geoms.len());
            }
        }
    }

    #[test]
    fn test_straddling_primitives_are_duplicated() {
        // Two clusters plus one big box spanning both: the box must appear
        // in leaves on both sides of the root split.
        let camera = Camera::new((4, 4), Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO);
        let mut scene = Scene::new(camera);
        scene.materials.push(Material::diffuse(Vec3::ONE));
        for i in 0..6 {
            let mut geom = Geom::new(GeomKind::Sphere, 0);
            geom.translation = Vec3::new(i as f32 * 4.0 - 10.0, 0.0, 0.0);
            scene.geoms.push(geom);
        }
        let mut wall = Geom::new(GeomKind::Cube, 0);
        wall.scale = Vec3::new(40.0, 1.0, 1.0);
        scene.geoms.push(wall);

        let prims = collect_primitives(&scene);
        let tree = build_kd_tree(&prims);
        let wall_id = (scene.geoms.len() - 1) as u32;
        let references = tree
            .prim_geoms
            .iter()
            .filter(|&&g| g == wall_id)
            .count();
        assert!(references >= 2, "straddler referenced from both sides");
    }

    #[test]
    fn test_empty_scene_builds_empty_tree() {
        let tree = build_kd_tree(&[]);
        assert_eq!(tree.node_count(), 0);
        assert!(tree.prim_geoms.is_empty());
    }

    #[test]
    fn test_mesh_instances_expand_per_triangle() {
        let camera = Camera::new((4, 4), Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO);
        let mut scene = Scene::new(camera);
        scene.materials.push(Material::diffuse(Vec3::ONE));
        scene.mesh.positions = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
        ];
        scene.mesh.normals = vec![Vec3::Z; 4];
        scene.mesh.uvs = vec![glam::Vec2::ZERO; 4];
        scene.mesh.indices = vec![[0, 1, 2], [1, 3, 2]];
        scene.geoms.push(Geom::new(
            GeomKind::Mesh {
                triangle_start: 0,
                triangle_count: 2,
            },
            0,
        ));

        let prims = collect_primitives(&scene);
        assert_eq!(prims.len(), 2);
        assert_eq!(prims[1].tri, 1);
    }
}
