//! Geometry descriptions attached to links
//!
//! These are the host-side shapes; the collision layer converts them into
//! [`CollisionGeometry`](crate::collision::CollisionGeometry) through the
//! primitive factory.

use crate::foundation::math::{Transform, Vec3};

/// Indexed triangle mesh in link-local coordinates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriMesh {
    /// Vertex positions
    pub vertices: Vec<Vec3>,
    /// Triangle vertex indices, three per triangle
    pub indices: Vec<u32>,
}

impl TriMesh {
    /// Creates a mesh from vertices and a flat index list
    pub fn new(vertices: Vec<Vec3>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// Number of complete triangles
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Axis-aligned box mesh with the given half extents, 12 triangles
    pub fn cuboid(half_extents: Vec3) -> Self {
        let h = half_extents;
        let vertices = vec![
            Vec3::new(-h.x, -h.y, -h.z),
            Vec3::new(h.x, -h.y, -h.z),
            Vec3::new(h.x, h.y, -h.z),
            Vec3::new(-h.x, h.y, -h.z),
            Vec3::new(-h.x, -h.y, h.z),
            Vec3::new(h.x, -h.y, h.z),
            Vec3::new(h.x, h.y, h.z),
            Vec3::new(-h.x, h.y, h.z),
        ];
        let indices = vec![
            0, 2, 1, 0, 3, 2, // -z
            4, 5, 6, 4, 6, 7, // +z
            0, 1, 5, 0, 5, 4, // -y
            3, 7, 6, 3, 6, 2, // +y
            0, 4, 7, 0, 7, 3, // -x
            1, 2, 6, 1, 6, 5, // +x
        ];
        Self { vertices, indices }
    }
}

/// Shape of one geometry element
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// No collision shape
    Empty,
    /// Box given by its half extents
    Box {
        /// Half size along each local axis
        half_extents: Vec3,
    },
    /// Sphere centred on the local origin
    Sphere {
        /// Sphere radius
        radius: f32,
    },
    /// Cylinder along the local Z axis
    Cylinder {
        /// Cylinder radius
        radius: f32,
        /// Full height along Z
        height: f32,
    },
    /// Triangle mesh
    TriMesh(TriMesh),
    /// Open box with walls; rendered by the host but without a collision counterpart
    Container {
        /// Outer half extents
        outer_extents: Vec3,
        /// Inner half extents
        inner_extents: Vec3,
    },
}

impl Shape {
    /// Short name used in log messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Box { .. } => "box",
            Self::Sphere { .. } => "sphere",
            Self::Cylinder { .. } => "cylinder",
            Self::TriMesh(_) => "trimesh",
            Self::Container { .. } => "container",
        }
    }
}

/// One geometry element of a link: a shape and its pose relative to the link frame
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryInfo {
    /// Shape description
    pub shape: Shape,
    /// Pose of the shape in the link frame
    pub local: Transform,
}

impl GeometryInfo {
    /// Creates a geometry element
    pub fn new(shape: Shape, local: Transform) -> Self {
        Self { shape, local }
    }

    /// Box at the given local pose
    pub fn cuboid(half_extents: Vec3, local: Transform) -> Self {
        Self::new(Shape::Box { half_extents }, local)
    }

    /// Sphere at the given local pose
    pub fn sphere(radius: f32, local: Transform) -> Self {
        Self::new(Shape::Sphere { radius }, local)
    }

    /// Cylinder at the given local pose
    pub fn cylinder(radius: f32, height: f32, local: Transform) -> Self {
        Self::new(Shape::Cylinder { radius, height }, local)
    }

    /// Triangle mesh at the given local pose
    pub fn mesh(mesh: TriMesh, local: Transform) -> Self {
        Self::new(Shape::TriMesh(mesh), local)
    }
}
