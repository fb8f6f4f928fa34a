//! Kinematic bodies
//!
//! A body is shared as `Rc<KinBody>`: the [`Scene`](super::Scene) holds the
//! strong reference, collision caches hold `Weak` ones. All mutation goes
//! through `&self` because the scene is single-threaded.

use std::any::Any;
use std::cell::{Cell, Ref, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use super::geometry::GeometryInfo;
use super::link::Link;
use super::BodyId;
use crate::foundation::math::Transform;

/// Handle returned by [`KinBody::subscribe_geometry_changed`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Callback fired with the body's id whenever link geometry changes
pub type GeometryChangedFn = Rc<dyn Fn(BodyId)>;

/// A kinematic body: an ordered list of links with a world pose each
pub struct KinBody {
    id: BodyId,
    name: String,
    links: RefCell<Vec<Link>>,
    transforms: RefCell<Vec<Transform>>,
    update_stamp: Cell<u64>,
    geometry_callbacks: RefCell<Vec<(SubscriptionId, GeometryChangedFn)>>,
    next_subscription: Cell<u64>,
    user_data: RefCell<HashMap<String, Rc<dyn Any>>>,
}

impl std::fmt::Debug for KinBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KinBody")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("links", &self.links.borrow().len())
            .field("update_stamp", &self.update_stamp.get())
            .finish_non_exhaustive()
    }
}

impl KinBody {
    pub(super) fn new(id: BodyId, name: String, mut links: Vec<Link>) -> Self {
        for (index, link) in links.iter_mut().enumerate() {
            link.set_index(index);
        }
        let transforms = vec![Transform::identity(); links.len()];
        Self {
            id,
            name,
            links: RefCell::new(links),
            transforms: RefCell::new(transforms),
            update_stamp: Cell::new(1),
            geometry_callbacks: RefCell::new(Vec::new()),
            next_subscription: Cell::new(0),
            user_data: RefCell::new(HashMap::new()),
        }
    }

    /// Stable identity of this body
    pub fn id(&self) -> BodyId {
        self.id
    }

    /// Body name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ordered link list
    pub fn links(&self) -> Ref<'_, [Link]> {
        Ref::map(self.links.borrow(), Vec::as_slice)
    }

    /// Number of links
    pub fn link_count(&self) -> usize {
        self.links.borrow().len()
    }

    /// Counter incremented on every pose change
    pub fn update_stamp(&self) -> u64 {
        self.update_stamp.get()
    }

    /// Current world transform of every link, in link order
    pub fn link_transforms(&self) -> Vec<Transform> {
        self.transforms.borrow().clone()
    }

    /// World transform of one link
    pub fn link_transform(&self, link: usize) -> Option<Transform> {
        self.transforms.borrow().get(link).copied()
    }

    /// Replace every link's world transform
    ///
    /// # Panics
    /// If `transforms` does not have one entry per link.
    pub fn set_link_transforms(&self, transforms: Vec<Transform>) {
        assert_eq!(
            transforms.len(),
            self.link_count(),
            "body '{}' expects one transform per link",
            self.name
        );
        *self.transforms.borrow_mut() = transforms;
        self.bump_stamp();
    }

    /// Move a single link
    ///
    /// # Panics
    /// If `link` is out of range.
    pub fn set_link_transform(&self, link: usize, transform: Transform) {
        self.transforms.borrow_mut()[link] = transform;
        self.bump_stamp();
    }

    /// Replace the geometry of a link and notify geometry subscribers
    ///
    /// `group` selects a named geometry group; `None` replaces the default list.
    ///
    /// # Panics
    /// If `link` is out of range.
    pub fn set_link_geometries(&self, link: usize, group: Option<&str>, geometries: Vec<GeometryInfo>) {
        self.links.borrow_mut()[link].replace_geometries(group, geometries);
        self.notify_geometry_changed();
    }

    /// Append a link at the identity pose
    ///
    /// This is a structural change: it bumps the update stamp but does not
    /// fire geometry notifications, so any collision cache of this body must
    /// be rebuilt explicitly before its next synchronization.
    pub fn add_link(&self, mut link: Link) -> usize {
        let index = {
            let mut links = self.links.borrow_mut();
            link.set_index(links.len());
            links.push(link);
            links.len() - 1
        };
        self.transforms.borrow_mut().push(Transform::identity());
        self.bump_stamp();
        index
    }

    /// Register a callback fired whenever link geometry changes
    pub fn subscribe_geometry_changed(&self, callback: GeometryChangedFn) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.get());
        self.next_subscription.set(id.0 + 1);
        self.geometry_callbacks.borrow_mut().push((id, callback));
        id
    }

    /// Remove a geometry callback; false if it was not registered
    pub fn unsubscribe_geometry_changed(&self, id: SubscriptionId) -> bool {
        let mut callbacks = self.geometry_callbacks.borrow_mut();
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != id);
        callbacks.len() != before
    }

    /// Number of live geometry subscriptions
    pub fn geometry_subscription_count(&self) -> usize {
        self.geometry_callbacks.borrow().len()
    }

    /// Attach opaque data under `key`, replacing any previous value
    pub fn set_user_data(&self, key: &str, data: Rc<dyn Any>) {
        self.user_data.borrow_mut().insert(key.to_string(), data);
    }

    /// Data attached under `key`
    pub fn user_data(&self, key: &str) -> Option<Rc<dyn Any>> {
        self.user_data.borrow().get(key).cloned()
    }

    /// Detach data under `key`; false if nothing was attached
    pub fn remove_user_data(&self, key: &str) -> bool {
        self.user_data.borrow_mut().remove(key).is_some()
    }

    fn bump_stamp(&self) {
        self.update_stamp.set(self.update_stamp.get().wrapping_add(1));
    }

    fn notify_geometry_changed(&self) {
        // Callbacks may re-enter the body, so release the borrow first
        let callbacks: Vec<GeometryChangedFn> = self
            .geometry_callbacks
            .borrow()
            .iter()
            .map(|(_, callback)| Rc::clone(callback))
            .collect();
        for callback in callbacks {
            callback(self.id);
        }
    }
}
