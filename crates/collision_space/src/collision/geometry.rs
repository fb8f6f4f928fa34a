//! Library-level collision geometry
//!
//! Shapes are stored in their local frame; the world box is derived on demand
//! from the owning primitive's pose.

use super::aabb::Aabb;
use super::bounding_volume::{BoundingVolume, BoundingVolumeKind, MeshBound};
use crate::foundation::math::{abs_matrix, Point3, Transform, Vec3};

/// Constructor of mesh geometry, resolved once from a [`BoundingVolumeKind`]
pub type MeshFactory = fn(&[Point3], &[[u32; 3]]) -> CollisionGeometry;

/// Build a mesh model whose bounding volume is `B`
pub fn build_mesh<B: BoundingVolume>(vertices: &[Point3], triangles: &[[u32; 3]]) -> CollisionGeometry {
    CollisionGeometry::Mesh(MeshModel {
        vertices: vertices.to_vec(),
        triangles: triangles.to_vec(),
        bound: B::fit(vertices).into_mesh_bound(),
    })
}

/// Triangle mesh with its fitted bounding volume
#[derive(Debug, Clone, PartialEq)]
pub struct MeshModel {
    /// Vertex positions in the mesh frame
    pub vertices: Vec<Point3>,
    /// Vertex index triples
    pub triangles: Vec<[u32; 3]>,
    /// Fitted bounding volume
    pub bound: MeshBound,
}

impl MeshModel {
    /// Bounding-volume kind this model was built with
    pub fn bounding_volume_kind(&self) -> BoundingVolumeKind {
        self.bound.kind()
    }
}

/// Geometry of one collision primitive
#[derive(Debug, Clone, PartialEq)]
pub enum CollisionGeometry {
    /// Box centred on the origin
    Box {
        /// Half size along each axis
        half_extents: Vec3,
    },
    /// Sphere centred on the origin
    Sphere {
        /// Sphere radius
        radius: f32,
    },
    /// Cylinder centred on the origin, axis along local Z
    Cylinder {
        /// Cylinder radius
        radius: f32,
        /// Half of the cylinder length
        half_height: f32,
    },
    /// Triangle mesh
    Mesh(MeshModel),
}

impl CollisionGeometry {
    /// World box of this geometry placed at `pose`
    pub fn world_aabb(&self, pose: &Transform) -> Aabb {
        match self {
            Self::Box { half_extents } => {
                let extents = abs_matrix(&pose.rotation_matrix()) * half_extents;
                Aabb::from_center_extents(pose.position, extents)
            }
            Self::Sphere { radius } => {
                Aabb::from_center_extents(pose.position, Vec3::repeat(*radius))
            }
            Self::Cylinder { radius, half_height } => {
                // Axis extent plus the disc's extent perpendicular to it
                let axis = pose.rotation * Vec3::z();
                let extents = axis.map(|a| {
                    half_height * a.abs() + radius * (1.0 - a * a).max(0.0).sqrt()
                });
                Aabb::from_center_extents(pose.position, extents)
            }
            Self::Mesh(model) => model.bound.world_aabb(pose),
        }
    }

    /// Box of this geometry in its own frame
    pub fn local_aabb(&self) -> Aabb {
        self.world_aabb(&Transform::identity())
    }

    /// Bounding-volume kind for meshes, `None` for analytic shapes
    pub fn bounding_volume_kind(&self) -> Option<BoundingVolumeKind> {
        match self {
            Self::Mesh(model) => Some(model.bounding_volume_kind()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Quat;
    use approx::assert_relative_eq;

    #[test]
    fn test_cylinder_lying_on_its_side() {
        let cylinder = CollisionGeometry::Cylinder { radius: 0.5, half_height: 2.0 };
        let pose = Transform::from_rotation(Quat::from_axis_angle(
            &Vec3::y_axis(),
            std::f32::consts::FRAC_PI_2,
        ));

        let aabb = cylinder.world_aabb(&pose);
        assert_relative_eq!(aabb.extents(), Vec3::new(2.0, 0.5, 0.5), epsilon = 1e-5);
    }

    #[test]
    fn test_mesh_records_its_bounding_volume_kind() {
        let vertices = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let mesh = BoundingVolumeKind::KIos.mesh_factory()(&vertices, &[[0, 1, 2]]);

        assert_eq!(mesh.bounding_volume_kind(), Some(BoundingVolumeKind::KIos));
        assert_eq!(
            CollisionGeometry::Sphere { radius: 1.0 }.bounding_volume_kind(),
            None
        );
    }
}
