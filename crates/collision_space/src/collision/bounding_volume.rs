//! Bounding-volume representations of mesh primitives
//!
//! Each mesh model carries one fitted volume in its local frame. The kind is
//! chosen at configuration time; swapping it only affects meshes built
//! afterwards. Whatever the kind, the broad phase sees the conservative world
//! [`Aabb`] the volume reports for the primitive's pose.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use nalgebra::SymmetricEigen;
use serde::{Deserialize, Serialize};

use super::aabb::Aabb;
use super::geometry::{build_mesh, MeshFactory};
use crate::foundation::math::{abs_matrix, Mat3, Point3, Transform, Vec3};
use crate::space::SpaceError;

/// Bounding-volume representation used for mesh models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoundingVolumeKind {
    /// Axis-aligned box in the mesh frame
    #[serde(rename = "AABB")]
    Aabb,
    /// Oriented box along the principal axes
    #[serde(rename = "OBB")]
    Obb,
    /// Rectangle swept sphere
    #[serde(rename = "RSS")]
    Rss,
    /// Oriented box combined with a rectangle swept sphere
    #[serde(rename = "OBBRSS")]
    ObbRss,
    /// Discrete-orientation polytope with 16 faces
    #[serde(rename = "kDOP16")]
    KDop16,
    /// Discrete-orientation polytope with 18 faces
    #[serde(rename = "kDOP18")]
    KDop18,
    /// Discrete-orientation polytope with 24 faces
    #[serde(rename = "kDOP24")]
    KDop24,
    /// Sphere and oriented box intersection (spherical shell hybrid)
    #[serde(rename = "kIOS")]
    KIos,
}

impl BoundingVolumeKind {
    /// Every kind, in declaration order
    pub const ALL: [Self; 8] = [
        Self::Aabb,
        Self::Obb,
        Self::Rss,
        Self::ObbRss,
        Self::KDop16,
        Self::KDop18,
        Self::KDop24,
        Self::KIos,
    ];

    /// Configuration name of this kind
    pub fn name(self) -> &'static str {
        match self {
            Self::Aabb => "AABB",
            Self::Obb => "OBB",
            Self::Rss => "RSS",
            Self::ObbRss => "OBBRSS",
            Self::KDop16 => "kDOP16",
            Self::KDop18 => "kDOP18",
            Self::KDop24 => "kDOP24",
            Self::KIos => "kIOS",
        }
    }

    /// Resolve the mesh constructor for this kind
    pub fn mesh_factory(self) -> MeshFactory {
        match self {
            Self::Aabb => build_mesh::<Aabb>,
            Self::Obb => build_mesh::<Obb>,
            Self::Rss => build_mesh::<Rss>,
            Self::ObbRss => build_mesh::<ObbRss>,
            Self::KDop16 => build_mesh::<KDop16>,
            Self::KDop18 => build_mesh::<KDop18>,
            Self::KDop24 => build_mesh::<KDop24>,
            Self::KIos => build_mesh::<KIos>,
        }
    }
}

impl fmt::Display for BoundingVolumeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BoundingVolumeKind {
    type Err = SpaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| SpaceError::UnknownBoundingVolume(s.to_string()))
    }
}

/// A volume that can be fitted around mesh vertices
pub trait BoundingVolume: Sized {
    /// Kind tag of this representation
    const KIND: BoundingVolumeKind;

    /// Fit the volume around `points` (mesh frame)
    fn fit(points: &[Point3]) -> Self;

    /// Conservative world box of the volume under `pose`
    fn world_aabb(&self, pose: &Transform) -> Aabb;

    /// Erase the concrete type
    fn into_mesh_bound(self) -> MeshBound;
}

/// Fitted volume stored on a mesh model
#[derive(Debug, Clone, PartialEq)]
pub enum MeshBound {
    /// See [`BoundingVolumeKind::Aabb`]
    Aabb(Aabb),
    /// See [`BoundingVolumeKind::Obb`]
    Obb(Obb),
    /// See [`BoundingVolumeKind::Rss`]
    Rss(Rss),
    /// See [`BoundingVolumeKind::ObbRss`]
    ObbRss(ObbRss),
    /// See [`BoundingVolumeKind::KDop16`]
    KDop16(KDop16),
    /// See [`BoundingVolumeKind::KDop18`]
    KDop18(KDop18),
    /// See [`BoundingVolumeKind::KDop24`]
    KDop24(KDop24),
    /// See [`BoundingVolumeKind::KIos`]
    KIos(KIos),
}

impl MeshBound {
    /// Kind of the stored volume
    pub fn kind(&self) -> BoundingVolumeKind {
        match self {
            Self::Aabb(_) => BoundingVolumeKind::Aabb,
            Self::Obb(_) => BoundingVolumeKind::Obb,
            Self::Rss(_) => BoundingVolumeKind::Rss,
            Self::ObbRss(_) => BoundingVolumeKind::ObbRss,
            Self::KDop16(_) => BoundingVolumeKind::KDop16,
            Self::KDop18(_) => BoundingVolumeKind::KDop18,
            Self::KDop24(_) => BoundingVolumeKind::KDop24,
            Self::KIos(_) => BoundingVolumeKind::KIos,
        }
    }

    /// Conservative world box under `pose`
    pub fn world_aabb(&self, pose: &Transform) -> Aabb {
        match self {
            Self::Aabb(bv) => bv.world_aabb(pose),
            Self::Obb(bv) => bv.world_aabb(pose),
            Self::Rss(bv) => bv.world_aabb(pose),
            Self::ObbRss(bv) => bv.world_aabb(pose),
            Self::KDop16(bv) => bv.world_aabb(pose),
            Self::KDop18(bv) => bv.world_aabb(pose),
            Self::KDop24(bv) => bv.world_aabb(pose),
            Self::KIos(bv) => bv.world_aabb(pose),
        }
    }
}

impl BoundingVolume for Aabb {
    const KIND: BoundingVolumeKind = BoundingVolumeKind::Aabb;

    fn fit(points: &[Point3]) -> Self {
        Aabb::from_points(points)
    }

    fn world_aabb(&self, pose: &Transform) -> Aabb {
        self.transformed(pose)
    }

    fn into_mesh_bound(self) -> MeshBound {
        MeshBound::Aabb(self)
    }
}

/// Principal axes of a point set, ordered by decreasing variance, right-handed
fn principal_axes(points: &[Point3]) -> Mat3 {
    if points.is_empty() {
        return Mat3::identity();
    }
    #[allow(clippy::cast_precision_loss)]
    let count = points.len() as f32;
    let mean = points.iter().fold(Vec3::zeros(), |acc, p| acc + p.coords) / count;

    let mut covariance = Mat3::zeros();
    for p in points {
        let d = p.coords - mean;
        covariance += d * d.transpose();
    }
    covariance /= count;

    let eigen = SymmetricEigen::new(covariance);
    let mut order = [0_usize, 1, 2];
    order.sort_by(|&a, &b| {
        eigen.eigenvalues[b]
            .partial_cmp(&eigen.eigenvalues[a])
            .unwrap_or(Ordering::Equal)
    });

    let major: Vec3 = eigen.eigenvectors.column(order[0]).into_owned();
    let middle: Vec3 = eigen.eigenvectors.column(order[1]).into_owned();
    Mat3::from_columns(&[major, middle, major.cross(&middle)])
}

/// Extent of `points` in the frame given by `axes`: (min, max) per axis
fn extent_along(axes: &Mat3, points: &[Point3]) -> (Vec3, Vec3) {
    let to_local = axes.transpose();
    points.iter().fold(
        (Vec3::repeat(f32::INFINITY), Vec3::repeat(f32::NEG_INFINITY)),
        |(lo, hi), p| {
            let local = to_local * p.coords;
            (lo.inf(&local), hi.sup(&local))
        },
    )
}

/// Oriented bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Obb {
    /// Centre in the mesh frame
    pub center: Vec3,
    /// Box axes as matrix columns
    pub axes: Mat3,
    /// Half size along each axis
    pub half_extents: Vec3,
}

impl Obb {
    fn world_box(center: &Vec3, axes: &Mat3, half_extents: &Vec3, pose: &Transform) -> Aabb {
        let world_center = pose.transform_point(&Point3::from(*center)).coords;
        let world_axes = pose.rotation_matrix() * axes;
        Aabb::from_center_extents(world_center, abs_matrix(&world_axes) * half_extents)
    }
}

impl BoundingVolume for Obb {
    const KIND: BoundingVolumeKind = BoundingVolumeKind::Obb;

    fn fit(points: &[Point3]) -> Self {
        let axes = principal_axes(points);
        let (lo, hi) = extent_along(&axes, points);
        Self {
            center: axes * ((lo + hi) * 0.5),
            axes,
            half_extents: (hi - lo) * 0.5,
        }
    }

    fn world_aabb(&self, pose: &Transform) -> Aabb {
        Self::world_box(&self.center, &self.axes, &self.half_extents, pose)
    }

    fn into_mesh_bound(self) -> MeshBound {
        MeshBound::Obb(self)
    }
}

/// Rectangle swept sphere: a rectangle in the two major axes, thickened by `radius`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rss {
    /// Rectangle centre in the mesh frame
    pub center: Vec3,
    /// Rectangle axes as matrix columns; the third is the rectangle normal
    pub axes: Mat3,
    /// Half side lengths of the rectangle
    pub half_lengths: [f32; 2],
    /// Sweep radius
    pub radius: f32,
}

impl BoundingVolume for Rss {
    const KIND: BoundingVolumeKind = BoundingVolumeKind::Rss;

    fn fit(points: &[Point3]) -> Self {
        let obb = Obb::fit(points);
        let radius = obb.half_extents.z;
        Self {
            center: obb.center,
            axes: obb.axes,
            half_lengths: [
                (obb.half_extents.x - radius).max(0.0),
                (obb.half_extents.y - radius).max(0.0),
            ],
            radius,
        }
    }

    fn world_aabb(&self, pose: &Transform) -> Aabb {
        let half_extents = Vec3::new(
            self.half_lengths[0] + self.radius,
            self.half_lengths[1] + self.radius,
            self.radius,
        );
        Obb::world_box(&self.center, &self.axes, &half_extents, pose)
    }

    fn into_mesh_bound(self) -> MeshBound {
        MeshBound::Rss(self)
    }
}

/// Oriented box and swept rectangle fitted together; the world bound is their overlap
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObbRss {
    /// Oriented box part
    pub obb: Obb,
    /// Swept rectangle part
    pub rss: Rss,
}

impl BoundingVolume for ObbRss {
    const KIND: BoundingVolumeKind = BoundingVolumeKind::ObbRss;

    fn fit(points: &[Point3]) -> Self {
        Self {
            obb: Obb::fit(points),
            rss: Rss::fit(points),
        }
    }

    fn world_aabb(&self, pose: &Transform) -> Aabb {
        self.obb.world_aabb(pose).intersection(&self.rss.world_aabb(pose))
    }

    fn into_mesh_bound(self) -> MeshBound {
        MeshBound::ObbRss(self)
    }
}

/// Slab normals of the k-DOPs; a k-DOP uses the first k/2 of them
const KDOP_DIRECTIONS: [[f32; 3]; 12] = [
    [1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
    [1.0, 1.0, 0.0],
    [1.0, 0.0, 1.0],
    [0.0, 1.0, 1.0],
    [1.0, -1.0, 0.0],
    [1.0, 0.0, -1.0],
    [0.0, 1.0, -1.0],
    [1.0, 1.0, -1.0],
    [1.0, -1.0, 1.0],
    [-1.0, 1.0, 1.0],
];

/// Discrete-orientation polytope bounded by `N` pairs of parallel slabs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KDop<const N: usize> {
    /// Lower slab offset per direction
    pub min: [f32; N],
    /// Upper slab offset per direction
    pub max: [f32; N],
}

/// 16-DOP
pub type KDop16 = KDop<8>;
/// 18-DOP
pub type KDop18 = KDop<9>;
/// 24-DOP
pub type KDop24 = KDop<12>;

impl<const N: usize> KDop<N> {
    fn fit_slabs(points: &[Point3]) -> Self {
        let mut min = [f32::INFINITY; N];
        let mut max = [f32::NEG_INFINITY; N];
        for p in points {
            for (i, direction) in KDOP_DIRECTIONS.iter().take(N).enumerate() {
                let d = Vec3::new(direction[0], direction[1], direction[2]).dot(&p.coords);
                min[i] = min[i].min(d);
                max[i] = max[i].max(d);
            }
        }
        Self { min, max }
    }

    /// The box cut out by the three axis slabs; it contains the polytope
    pub fn axis_box(&self) -> Aabb {
        Aabb::new(
            Vec3::new(self.min[0], self.min[1], self.min[2]),
            Vec3::new(self.max[0], self.max[1], self.max[2]),
        )
    }

    /// True if `point` (mesh frame) lies within every slab
    pub fn contains_point(&self, point: &Vec3) -> bool {
        KDOP_DIRECTIONS.iter().take(N).enumerate().all(|(i, direction)| {
            let d = Vec3::new(direction[0], direction[1], direction[2]).dot(point);
            d >= self.min[i] && d <= self.max[i]
        })
    }
}

macro_rules! impl_kdop {
    ($alias:ident, $kind:ident) => {
        impl BoundingVolume for $alias {
            const KIND: BoundingVolumeKind = BoundingVolumeKind::$kind;

            fn fit(points: &[Point3]) -> Self {
                Self::fit_slabs(points)
            }

            fn world_aabb(&self, pose: &Transform) -> Aabb {
                self.axis_box().transformed(pose)
            }

            fn into_mesh_bound(self) -> MeshBound {
                MeshBound::$kind(self)
            }
        }
    };
}

impl_kdop!(KDop16, KDop16);
impl_kdop!(KDop18, KDop18);
impl_kdop!(KDop24, KDop24);

/// Bounding sphere intersected with an oriented box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KIos {
    /// Sphere centre in the mesh frame
    pub center: Vec3,
    /// Sphere radius
    pub radius: f32,
    /// Oriented box the sphere is clipped by
    pub obb: Obb,
}

impl BoundingVolume for KIos {
    const KIND: BoundingVolumeKind = BoundingVolumeKind::KIos;

    fn fit(points: &[Point3]) -> Self {
        let obb = Obb::fit(points);
        let radius = points
            .iter()
            .map(|p| (p.coords - obb.center).norm())
            .fold(0.0_f32, f32::max);
        Self {
            center: obb.center,
            radius,
            obb,
        }
    }

    fn world_aabb(&self, pose: &Transform) -> Aabb {
        let center = pose.transform_point(&Point3::from(self.center)).coords;
        let sphere = Aabb::from_center_extents(center, Vec3::repeat(self.radius));
        sphere.intersection(&self.obb.world_aabb(pose))
    }

    fn into_mesh_bound(self) -> MeshBound {
        MeshBound::KIos(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Quat;

    fn tetrahedron() -> Vec<Point3> {
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 0.5),
        ]
    }

    fn assert_encloses(bound: &Aabb, points: &[Point3], pose: &Transform) {
        for p in points {
            let world = pose.transform_point(p).coords;
            assert!(
                bound.expanded(1e-4).contains_point(world),
                "{world:?} escapes {bound:?}"
            );
        }
    }

    #[test]
    fn test_names_round_trip() {
        for kind in BoundingVolumeKind::ALL {
            assert_eq!(kind.name().parse::<BoundingVolumeKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_name_is_an_error() {
        assert!(matches!(
            "kDOP32".parse::<BoundingVolumeKind>(),
            Err(SpaceError::UnknownBoundingVolume(name)) if name == "kDOP32"
        ));
    }

    #[test]
    fn test_every_volume_encloses_its_points() {
        let points = tetrahedron();
        let pose = Transform::from_position_rotation(
            Vec3::new(1.0, -2.0, 3.0),
            Quat::from_euler_angles(0.3, -0.8, 1.2),
        );

        let bounds = [
            Aabb::fit(&points).into_mesh_bound(),
            Obb::fit(&points).into_mesh_bound(),
            Rss::fit(&points).into_mesh_bound(),
            ObbRss::fit(&points).into_mesh_bound(),
            KDop16::fit(&points).into_mesh_bound(),
            KDop18::fit(&points).into_mesh_bound(),
            KDop24::fit(&points).into_mesh_bound(),
            KIos::fit(&points).into_mesh_bound(),
        ];
        for (bound, kind) in bounds.iter().zip(BoundingVolumeKind::ALL) {
            assert_eq!(bound.kind(), kind);
            assert_encloses(&bound.world_aabb(&pose), &points, &pose);
        }
    }

    #[test]
    fn test_kdop_contains_its_points() {
        let points = tetrahedron();
        let kdop = KDop24::fit(&points);
        for p in &points {
            assert!(kdop.contains_point(&p.coords));
        }
        assert!(!kdop.contains_point(&Vec3::new(2.0, 1.0, 0.5)));
    }
}
