//! Conversion of host shapes into collision geometry

use std::cell::Cell;

use super::bounding_volume::BoundingVolumeKind;
use super::geometry::{CollisionGeometry, MeshFactory};
use crate::foundation::math::Point3;
use crate::scene::{Shape, TriMesh};

/// Builds [`CollisionGeometry`] from [`Shape`] descriptions
///
/// The bounding-volume kind is resolved to a [`MeshFactory`] once, when it is
/// set. Analytic shapes do not depend on it.
#[derive(Debug)]
pub struct PrimitiveFactory {
    bounding_volume: BoundingVolumeKind,
    mesh_factory: MeshFactory,
    build_count: Cell<usize>,
}

impl PrimitiveFactory {
    /// Create a factory whose meshes carry `bounding_volume`
    pub fn new(bounding_volume: BoundingVolumeKind) -> Self {
        Self {
            bounding_volume,
            mesh_factory: bounding_volume.mesh_factory(),
            build_count: Cell::new(0),
        }
    }

    /// Bounding-volume kind of meshes built from now on
    pub fn bounding_volume(&self) -> BoundingVolumeKind {
        self.bounding_volume
    }

    /// Switch the bounding volume used for future meshes
    pub fn set_bounding_volume(&mut self, kind: BoundingVolumeKind) {
        self.bounding_volume = kind;
        self.mesh_factory = kind.mesh_factory();
    }

    /// Number of `build` calls so far, successful or not
    pub fn build_count(&self) -> usize {
        self.build_count.get()
    }

    /// Convert one shape; `None` means the geometry is skipped
    pub fn build(&self, shape: &Shape) -> Option<CollisionGeometry> {
        self.build_count.set(self.build_count.get() + 1);
        match shape {
            Shape::Empty => None,
            Shape::Box { half_extents } => Some(CollisionGeometry::Box {
                half_extents: *half_extents,
            }),
            Shape::Sphere { radius } => Some(CollisionGeometry::Sphere { radius: *radius }),
            Shape::Cylinder { radius, height } => Some(CollisionGeometry::Cylinder {
                radius: *radius,
                half_height: height * 0.5,
            }),
            Shape::TriMesh(mesh) => self.build_mesh(mesh),
            Shape::Container { .. } => {
                log::warn!("No collision geometry for shape type '{}'", shape.type_name());
                None
            }
        }
    }

    fn build_mesh(&self, mesh: &TriMesh) -> Option<CollisionGeometry> {
        if mesh.vertices.is_empty() || mesh.indices.is_empty() {
            return None;
        }
        if mesh.indices.len() % 3 != 0 {
            log::warn!(
                "Skipping mesh: {} indices is not a whole number of triangles",
                mesh.indices.len()
            );
            return None;
        }
        let vertex_count = mesh.vertices.len();
        if let Some(bad) = mesh.indices.iter().find(|&&i| i as usize >= vertex_count) {
            log::warn!("Skipping mesh: index {bad} out of range for {vertex_count} vertices");
            return None;
        }

        let vertices: Vec<Point3> = mesh.vertices.iter().map(|v| Point3::from(*v)).collect();
        let triangles: Vec<[u32; 3]> = mesh
            .indices
            .chunks_exact(3)
            .map(|t| [t[0], t[1], t[2]])
            .collect();
        Some((self.mesh_factory)(&vertices, &triangles))
    }
}

impl Default for PrimitiveFactory {
    fn default() -> Self {
        Self::new(BoundingVolumeKind::Obb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use approx::assert_relative_eq;

    #[test]
    fn test_analytic_shapes() {
        let factory = PrimitiveFactory::default();

        let cube = factory
            .build(&Shape::Box { half_extents: Vec3::new(1.0, 2.0, 3.0) })
            .unwrap();
        assert_eq!(cube, CollisionGeometry::Box { half_extents: Vec3::new(1.0, 2.0, 3.0) });

        match factory.build(&Shape::Cylinder { radius: 0.25, height: 3.0 }) {
            Some(CollisionGeometry::Cylinder { radius, half_height }) => {
                assert_relative_eq!(radius, 0.25);
                assert_relative_eq!(half_height, 1.5);
            }
            other => panic!("expected a cylinder, got {other:?}"),
        }
    }

    #[test]
    fn test_unsupported_and_degenerate_shapes_are_skipped() {
        let factory = PrimitiveFactory::default();

        assert!(factory.build(&Shape::Empty).is_none());
        assert!(factory
            .build(&Shape::Container {
                outer_extents: Vec3::repeat(1.0),
                inner_extents: Vec3::repeat(0.9),
            })
            .is_none());
        assert!(factory.build(&Shape::TriMesh(TriMesh::default())).is_none());

        let ragged = TriMesh::new(vec![Vec3::zeros(), Vec3::x(), Vec3::y()], vec![0, 1]);
        assert!(factory.build(&Shape::TriMesh(ragged)).is_none());

        let out_of_range = TriMesh::new(vec![Vec3::zeros(), Vec3::x(), Vec3::y()], vec![0, 1, 3]);
        assert!(factory.build(&Shape::TriMesh(out_of_range)).is_none());

        assert_eq!(factory.build_count(), 5);
    }

    #[test]
    fn test_bounding_volume_switch_affects_new_meshes_only() {
        let mut factory = PrimitiveFactory::new(BoundingVolumeKind::Aabb);
        let shape = Shape::TriMesh(TriMesh::cuboid(Vec3::repeat(0.5)));

        let before = factory.build(&shape).unwrap();
        factory.set_bounding_volume(BoundingVolumeKind::KDop24);
        let after = factory.build(&shape).unwrap();

        assert_eq!(before.bounding_volume_kind(), Some(BoundingVolumeKind::Aabb));
        assert_eq!(after.bounding_volume_kind(), Some(BoundingVolumeKind::KDop24));
        assert_eq!(factory.bounding_volume(), BoundingVolumeKind::KDop24);
    }
}
