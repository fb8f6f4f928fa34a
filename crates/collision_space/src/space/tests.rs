use std::cell::Cell;
use std::collections::BTreeSet;
use std::rc::Rc;

use approx::assert_relative_eq;

use super::*;
use crate::broadphase::{BroadPhaseAlgorithm, BroadPhaseIndex};
use crate::collision::{BoundingVolumeKind, PrimitiveKey};
use crate::config::SpaceConfig;
use crate::foundation::logging;
use crate::foundation::math::{Transform, Vec3};
use crate::scene::{GeometryInfo, KinBody, Link, Scene, TriMesh};

fn member_set(index: &dyn BroadPhaseIndex) -> BTreeSet<PrimitiveKey> {
    index.members().into_iter().map(|proxy| proxy.key).collect()
}

fn unit_box() -> GeometryInfo {
    GeometryInfo::cuboid(Vec3::new(1.0, 1.0, 1.0), Transform::identity())
}

/// Two-link arm: a box on the first link, a box and a sphere on the second
fn add_arm(scene: &mut Scene, name: &str, offset: Vec3) -> Rc<KinBody> {
    let body = scene.add_body(
        name,
        vec![
            Link::new("base", vec![unit_box()]),
            Link::new(
                "tip",
                vec![
                    GeometryInfo::cuboid(Vec3::new(0.5, 0.5, 0.5), Transform::identity()),
                    GeometryInfo::sphere(0.25, Transform::from_position(Vec3::new(0.0, 0.0, 1.0))),
                ],
            )
            .with_group("self", vec![GeometryInfo::sphere(0.75, Transform::identity())]),
        ],
    );
    body.set_link_transforms(vec![
        Transform::from_position(offset),
        Transform::from_position(offset + Vec3::new(0.0, 0.0, 2.0)),
    ]);
    body
}

fn setup() -> (Scene, SpaceManager, Rc<KinBody>, Rc<KinBody>) {
    logging::init_for_tests();
    let mut scene = Scene::new();
    let a = add_arm(&mut scene, "a", Vec3::zeros());
    let b = add_arm(&mut scene, "b", Vec3::new(10.0, 0.0, 0.0));
    let mut space = SpaceManager::default();
    space.init_body(&a);
    space.init_body(&b);
    (scene, space, a, b)
}

fn assert_hierarchy_consistent(space: &SpaceManager, body: &KinBody) {
    let cache = space.cache(body.id()).unwrap();
    let body_members = member_set(cache.index());
    let union: BTreeSet<PrimitiveKey> = cache
        .links()
        .iter()
        .flat_map(|link| member_set(link.index()))
        .collect();
    assert_eq!(body_members, union);

    let environment = member_set(space.environment_index());
    assert!(body_members.is_subset(&environment));
}

#[test]
fn test_init_body_fills_every_scope() {
    let (_scene, space, a, b) = setup();

    assert_hierarchy_consistent(&space, &a);
    assert_hierarchy_consistent(&space, &b);
    assert_eq!(space.environment_index().len(), 6);
    assert_eq!(space.primitive_count(), 6);
    assert_eq!(space.link_collision_objects(a.id(), 1).unwrap().len(), 2);

    let cache = space.cache(a.id()).unwrap();
    assert_eq!(cache.last_sync_stamp(), a.update_stamp());
    assert!(cache.is_subscribed());
    assert_eq!(a.geometry_subscription_count(), 1);

    let key = space.link_collision_objects(a.id(), 1).unwrap()[0];
    let primitive = space.primitive(key).unwrap();
    assert_eq!(primitive.owner().link, 1);
    assert_eq!(primitive.name(), "a/tip");
}

#[test]
fn test_get_or_create_cache_is_lazy() {
    logging::init_for_tests();
    let mut scene = Scene::new();
    let a = add_arm(&mut scene, "a", Vec3::zeros());
    let mut space = SpaceManager::default();

    assert!(space.cache_of(&a).is_none());
    let (_, created) = space.get_or_create_cache(&a);
    assert!(created);
    let builds = space.factory_build_count();

    let (cache, created) = space.get_or_create_cache(&a);
    assert!(!created);
    assert_eq!(cache.id(), a.id());
    assert_eq!(space.factory_build_count(), builds);
    assert!(a.user_data(space.user_data_key()).is_some());
}

#[test]
fn test_box_follows_link_transform() {
    logging::init_for_tests();
    let mut scene = Scene::new();
    let body = scene.add_body("crate", vec![Link::new("base", vec![unit_box()])]);
    body.set_link_transform(0, Transform::from_position(Vec3::new(5.0, 0.0, 0.0)));

    let mut space = SpaceManager::default();
    space.init_body(&body);
    space.synchronize().unwrap();

    let key = space.collision_objects(body.id()).unwrap()[0];
    let primitive = space.primitive(key).unwrap();
    assert_relative_eq!(primitive.translation(), Vec3::new(5.0, 0.0, 0.0));

    let aabb = space.environment_index().members()[0].aabb;
    assert_relative_eq!(aabb.min, Vec3::new(4.0, -1.0, -1.0));
    assert_relative_eq!(aabb.max, Vec3::new(6.0, 1.0, 1.0));
}

#[test]
fn test_empty_mesh_is_skipped() {
    logging::init_for_tests();
    let mut scene = Scene::new();
    let empty = TriMesh::new(Vec::new(), vec![0, 1, 2]);
    let body = scene.add_body(
        "ghost",
        vec![
            Link::new("hollow", vec![GeometryInfo::mesh(empty, Transform::identity())]),
            Link::new("solid", vec![unit_box()]),
        ],
    );

    let mut space = SpaceManager::default();
    let cache = space.init_body(&body);
    assert_eq!(cache.links().len(), 2);
    assert!(cache.links()[0].index().is_empty());
    assert_eq!(cache.links()[1].index().len(), 1);
    assert!(space.link_index(body.id(), 0).unwrap().members().is_empty());
}

#[test]
fn test_second_synchronize_is_a_no_op() {
    let (_scene, mut space, a, _b) = setup();
    let syncs = Rc::new(Cell::new(0));
    let counter = Rc::clone(&syncs);
    space.set_synchronization_callback(Some(Box::new(move |_: &BodyCache| counter.set(counter.get() + 1))));

    a.set_link_transform(0, Transform::from_position(Vec3::new(0.0, 3.0, 0.0)));
    assert_eq!(space.synchronize().unwrap(), 1);
    assert_eq!(syncs.get(), 1);

    assert_eq!(space.synchronize().unwrap(), 0);
    assert!(!space.synchronize_body(&a));
    assert_eq!(syncs.get(), 1);
}

#[test]
fn test_unchanged_stamp_keeps_poses_bit_identical() {
    let (_scene, mut space, a, _b) = setup();
    let keys = space.collision_objects(a.id()).unwrap();
    let before: Vec<Transform> = keys.iter().map(|&key| space.primitive(key).unwrap().pose()).collect();
    let members_before = space.environment_index().members();

    space.synchronize().unwrap();

    let after: Vec<Transform> = keys.iter().map(|&key| space.primitive(key).unwrap().pose()).collect();
    assert_eq!(before, after);
    assert_eq!(space.environment_index().members(), members_before);
}

#[test]
fn test_synchronize_moves_all_three_scopes() {
    let (_scene, mut space, a, _b) = setup();
    let key = space.link_collision_objects(a.id(), 0).unwrap()[0];

    a.set_link_transform(0, Transform::from_position(Vec3::new(0.0, -4.0, 0.0)));
    space.synchronize_body(&a);

    let query = crate::collision::Aabb::from_center_extents(Vec3::new(0.0, -4.0, 0.0), Vec3::repeat(0.1));
    assert_eq!(space.environment_index().query_aabb(&query), vec![key]);
    assert_eq!(space.body_index(a.id()).unwrap().query_aabb(&query), vec![key]);
    assert_eq!(space.link_index(a.id(), 0).unwrap().query_aabb(&query), vec![key]);
}

#[test]
fn test_synchronize_body_creates_missing_cache() {
    logging::init_for_tests();
    let mut scene = Scene::new();
    let a = add_arm(&mut scene, "a", Vec3::zeros());
    let mut space = SpaceManager::default();

    assert!(space.synchronize_body(&a));
    assert!(space.is_initialized(a.id()));
    assert_eq!(space.initialized_bodies().collect::<Vec<_>>(), vec![a.id()]);
}

#[test]
#[should_panic(expected = "is stale")]
fn test_structural_change_without_rebuild_panics() {
    let (_scene, mut space, a, _b) = setup();
    a.add_link(Link::new("extra", vec![unit_box()]));
    let _ = space.synchronize();
}

#[test]
fn test_init_body_again_rebuilds_in_place() {
    let (_scene, mut space, a, _b) = setup();
    let old_keys = member_set(space.body_index(a.id()).unwrap());
    a.add_link(Link::new("extra", vec![unit_box()]));

    let cache = space.init_body(&a);
    assert_eq!(cache.links().len(), 3);
    assert_eq!(cache.last_sync_stamp(), a.update_stamp());

    assert_eq!(space.primitive_count(), 7);
    assert_eq!(space.environment_index().len(), 7);
    assert!(member_set(space.environment_index()).is_disjoint(&old_keys));
    assert_eq!(space.link_collision_objects(a.id(), 2).unwrap().len(), 1);
    assert_eq!(a.geometry_subscription_count(), 1);
    assert_hierarchy_consistent(&space, &a);
    assert_eq!(space.initialized_bodies().count(), 2);
    assert_eq!(space.synchronize().unwrap(), 0);
}

#[test]
fn test_view_round_trip_for_every_policy() {
    let (_scene, mut space, a, b) = setup();
    let before = space.environment_index().members();

    for policy in [ViewPolicy::Borrow, ViewPolicy::Wrap, ViewPolicy::Exclude] {
        let mut view = match policy {
            ViewPolicy::Borrow => space.borrow_view(),
            ViewPolicy::Wrap => space.wrap_view(),
            ViewPolicy::Exclude => space.exclusion_view(),
        };
        view.register_link(a.id(), 1).unwrap();
        view.register_body(a.id()).unwrap();
        view.register_body(b.id()).unwrap();
        view.register_body(b.id()).unwrap();
        assert_eq!(view.policy(), policy);
        drop(view);

        assert_eq!(space.environment_index().members(), before, "{policy:?}");
    }
}

#[test]
fn test_borrow_view_holds_bodies_out_of_environment() {
    let (mut scene, mut space, a, b) = setup();
    let c = add_arm(&mut scene, "c", Vec3::new(-10.0, 0.0, 0.0));
    space.init_body(&c);

    let a_keys = member_set(space.body_index(a.id()).unwrap());
    let b_keys = member_set(space.body_index(b.id()).unwrap());
    let c_keys = member_set(space.body_index(c.id()).unwrap());
    let before = member_set(space.environment_index());

    let mut view = space.borrow_view();
    view.register_body(a.id()).unwrap();
    view.register_body(b.id()).unwrap();

    let environment = member_set(view.space().environment_index());
    assert!(environment.is_disjoint(&a_keys));
    assert!(environment.is_disjoint(&b_keys));
    assert_eq!(environment, c_keys);
    assert_eq!(view.removed_count(), 6);

    let held = member_set(view.view());
    assert_eq!(held, a_keys.union(&b_keys).copied().collect());
    view.release();

    assert_eq!(member_set(space.environment_index()), before);
}

#[test]
fn test_wrap_view_leaves_environment_alone() {
    let (_scene, mut space, a, _b) = setup();
    let before = space.environment_index().members();

    let mut view = space.wrap_view();
    view.register_body(a.id()).unwrap();
    assert_eq!(view.removed_count(), 0);
    assert_eq!(view.view().len(), 3);
    assert_eq!(view.space().environment_index().members(), before);
}

#[test]
fn test_exclusion_view_exposes_shrunk_environment() {
    let (_scene, mut space, a, b) = setup();
    let b_keys = member_set(space.body_index(b.id()).unwrap());

    let mut view = space.exclusion_view();
    view.register_body(a.id()).unwrap();
    assert_eq!(member_set(view.view()), b_keys);
    assert_eq!(view.removed().len(), 3);
    view.release();

    assert_eq!(space.environment_index().len(), 6);
}

#[test]
fn test_view_sees_pending_geometry_changes() {
    let (_scene, mut space, a, _b) = setup();
    a.set_link_geometries(0, None, vec![unit_box(), unit_box()]);

    let mut view = space.borrow_view();
    view.register_body(a.id()).unwrap();
    assert_eq!(view.view().len(), 4);
    assert_eq!(view.removed_count(), 4);
    assert_eq!(view.space().environment_index().len(), 3);
    view.release();

    assert_eq!(space.environment_index().len(), 7);
    assert_eq!(space.primitive_count(), 7);
    assert_hierarchy_consistent(&space, &a);
    assert_eq!(space.process_geometry_changes(), 0);
}

#[test]
fn test_view_registration_errors() {
    let (mut scene, mut space, a, _b) = setup();
    let stranger = add_arm(&mut scene, "stranger", Vec3::zeros());

    let mut view = space.borrow_view();
    assert!(matches!(
        view.register_body(stranger.id()),
        Err(SpaceError::BodyNotInitialized(_))
    ));
    assert!(matches!(
        view.register_link(a.id(), 7),
        Err(SpaceError::LinkOutOfRange { link: 7, .. })
    ));
    assert_eq!(view.removed_count(), 0);
}

#[test]
fn test_algorithm_switch_keeps_members_without_rebuilding() {
    let (_scene, mut space, a, _b) = setup();
    let environment = space.environment_index().members();
    let body = space.body_index(a.id()).unwrap().members();
    let link = space.link_index(a.id(), 1).unwrap().members();
    let builds = space.factory_build_count();

    for algorithm in BroadPhaseAlgorithm::ALL {
        space.set_broad_phase_algorithm(algorithm);
        assert_eq!(space.broad_phase_algorithm(), algorithm);
        assert_eq!(space.environment_index().algorithm(), algorithm);
        assert_eq!(space.body_index(a.id()).unwrap().algorithm(), algorithm);

        assert_eq!(space.environment_index().members(), environment);
        assert_eq!(space.body_index(a.id()).unwrap().members(), body);
        assert_eq!(space.link_index(a.id(), 1).unwrap().members(), link);
    }
    assert_eq!(space.factory_build_count(), builds);
}

#[test]
fn test_geometry_group_rebuilds_from_group_geometry() {
    let (_scene, mut space, a, _b) = setup();
    let old_keys = member_set(space.body_index(a.id()).unwrap());

    space.set_geometry_group("self");
    assert_eq!(space.geometry_group(), "self");

    // base has no "self" group and falls back to its default box
    let tip = space.link_collision_objects(a.id(), 1).unwrap();
    assert_eq!(tip.len(), 1);
    assert!(matches!(
        space.primitive(tip[0]).unwrap().geometry(),
        crate::collision::CollisionGeometry::Sphere { .. }
    ));
    assert_eq!(space.collision_objects(a.id()).unwrap().len(), 2);

    let environment = member_set(space.environment_index());
    assert!(environment.is_disjoint(&old_keys));
    assert_eq!(environment.len(), 4);
    assert_eq!(space.primitive_count(), 4);
    assert_hierarchy_consistent(&space, &a);
    assert_eq!(a.geometry_subscription_count(), 1);
}

#[test]
fn test_geometry_change_notification_rebuilds_cache() {
    let (_scene, mut space, a, _b) = setup();
    let old_keys = member_set(space.body_index(a.id()).unwrap());

    a.set_link_geometries(0, None, vec![unit_box(), unit_box()]);
    a.set_link_geometries(0, None, vec![unit_box(), unit_box(), unit_box()]);
    space.synchronize().unwrap();

    assert_eq!(space.link_collision_objects(a.id(), 0).unwrap().len(), 3);
    assert!(member_set(space.environment_index()).is_disjoint(&old_keys));
    assert_hierarchy_consistent(&space, &a);
    assert_eq!(space.process_geometry_changes(), 0);
}

#[test]
fn test_bounding_volume_switch_is_not_retroactive() {
    logging::init_for_tests();
    let mut scene = Scene::new();
    let mesh = || GeometryInfo::mesh(TriMesh::cuboid(Vec3::new(1.0, 2.0, 3.0)), Transform::identity());
    let body = scene.add_body("hull", vec![Link::new("shell", vec![mesh()])]);

    let mut space = SpaceManager::default();
    space.init_body(&body);
    let builds = space.factory_build_count();

    space.set_bounding_volume_kind(BoundingVolumeKind::KDop18);
    assert_eq!(space.bounding_volume_kind(), BoundingVolumeKind::KDop18);
    assert_eq!(space.factory_build_count(), builds);

    let key = space.collision_objects(body.id()).unwrap()[0];
    let kind = space.primitive(key).unwrap().geometry().bounding_volume_kind();
    assert_eq!(kind, Some(BoundingVolumeKind::Obb));

    body.set_link_geometries(0, None, vec![mesh()]);
    space.synchronize().unwrap();
    let key = space.collision_objects(body.id()).unwrap()[0];
    let kind = space.primitive(key).unwrap().geometry().bounding_volume_kind();
    assert_eq!(kind, Some(BoundingVolumeKind::KDop18));
}

#[test]
fn test_unknown_names_are_rejected() {
    let (_scene, mut space, _a, _b) = setup();

    assert!(matches!(
        space.set_bounding_volume_by_name("sphere-tree"),
        Err(SpaceError::UnknownBoundingVolume(_))
    ));
    assert!(matches!(
        space.set_broad_phase_algorithm_by_name("Octree"),
        Err(SpaceError::UnknownBroadPhaseAlgorithm(_))
    ));
    assert_eq!(space.bounding_volume_kind(), BoundingVolumeKind::Obb);
    assert_eq!(space.broad_phase_algorithm(), BroadPhaseAlgorithm::DynamicAabbTree);

    space.set_broad_phase_algorithm_by_name("SaP").unwrap();
    assert_eq!(space.broad_phase_algorithm(), BroadPhaseAlgorithm::SweepAndPrune);
    space.set_bounding_volume_by_name("OBBRSS").unwrap();
    assert_eq!(space.bounding_volume_kind(), BoundingVolumeKind::ObbRss);
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = SpaceConfig {
        user_data_key: String::new(),
        ..SpaceConfig::default()
    };
    assert!(matches!(SpaceManager::new(config), Err(SpaceError::Config(_))));
}

#[test]
fn test_remove_body_clears_everything() {
    let (_scene, mut space, a, b) = setup();

    assert!(space.remove_body(&a));
    assert!(!space.is_initialized(a.id()));
    assert!(a.user_data(space.user_data_key()).is_none());
    assert_eq!(a.geometry_subscription_count(), 0);
    assert_eq!(space.environment_index().len(), 3);
    assert_eq!(space.primitive_count(), 3);
    assert!(matches!(space.body_index(a.id()), Err(SpaceError::BodyNotInitialized(_))));

    assert!(!space.remove_body(&a));

    // Missing user data is only a warning
    b.remove_user_data(space.user_data_key());
    assert!(space.remove_body(&b));
    assert!(space.environment_index().is_empty());
}

#[test]
fn test_dropped_body_is_reported_then_destroyed() {
    let (mut scene, mut space, a, b) = setup();
    let a_id = a.id();
    drop(a);
    drop(scene.remove_body(a_id));

    assert!(matches!(space.synchronize(), Err(SpaceError::BodyExpired(id)) if id == a_id));

    space.destroy();
    assert_eq!(space.initialized_bodies().count(), 0);
    assert!(space.environment_index().is_empty());
    assert_eq!(space.primitive_count(), 0);
    assert!(b.user_data(space.user_data_key()).is_none());
    assert_eq!(b.geometry_subscription_count(), 0);
}

#[test]
fn test_spatial_hash_space_from_config() {
    logging::init_for_tests();
    let config = SpaceConfig {
        broad_phase: BroadPhaseAlgorithm::SpatialHash,
        spatial_hash_cell_size: 2.0,
        geometry_group: "self".to_string(),
        ..SpaceConfig::default()
    };
    let mut scene = Scene::new();
    let a = add_arm(&mut scene, "a", Vec3::zeros());
    let b = add_arm(&mut scene, "b", Vec3::new(0.5, 0.0, 0.0));

    let mut space = SpaceManager::new(config).unwrap();
    space.init_body(&a);
    space.init_body(&b);

    let pairs = space
        .body_index(a.id())
        .unwrap()
        .overlapping_with(space.body_index(b.id()).unwrap());
    assert!(!pairs.is_empty());
    assert_eq!(space.environment_index().algorithm(), BroadPhaseAlgorithm::SpatialHash);
}
