//! Kinematic scene model
//!
//! The collision cache only consumes a small slice of the host scene:
//!
//! ```text
//! Scene
//!   └─ KinBody (id, update stamp, associated data, geometry notifications)
//!        └─ Link (index, default geometry, named geometry groups)
//!             └─ GeometryInfo (shape + local transform)
//! ```
//!
//! The scene owns its bodies; everything downstream holds weak references
//! or plain ids.

mod body;
mod geometry;
mod link;

use std::rc::Rc;

use slotmap::SlotMap;

pub use body::{GeometryChangedFn, KinBody, SubscriptionId};
pub use geometry::{GeometryInfo, Shape, TriMesh};
pub use link::Link;

slotmap::new_key_type! {
    /// Stable identity of a body within its scene
    pub struct BodyId;
}

/// Owner of every kinematic body
#[derive(Debug, Default)]
pub struct Scene {
    bodies: SlotMap<BodyId, Rc<KinBody>>,
}

impl Scene {
    /// Create an empty scene
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a body built from `links`; links are indexed in the given order
    pub fn add_body(&mut self, name: impl Into<String>, links: Vec<Link>) -> Rc<KinBody> {
        let name = name.into();
        let id = self
            .bodies
            .insert_with_key(|id| Rc::new(KinBody::new(id, name, links)));
        Rc::clone(&self.bodies[id])
    }

    /// Remove a body, returning the scene's reference to it
    pub fn remove_body(&mut self, id: BodyId) -> Option<Rc<KinBody>> {
        self.bodies.remove(id)
    }

    /// Look up a body
    pub fn body(&self, id: BodyId) -> Option<&Rc<KinBody>> {
        self.bodies.get(id)
    }

    /// Iterate over all bodies
    pub fn bodies(&self) -> impl Iterator<Item = &Rc<KinBody>> {
        self.bodies.values()
    }

    /// Number of bodies
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    /// True when the scene holds no bodies
    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }
}
