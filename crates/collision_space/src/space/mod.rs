//! Collision space
//!
//! Keeps collision primitives in step with a kinematic scene:
//!
//! ```text
//! SpaceManager
//!   ├─ environment index (every primitive of every initialized body)
//!   └─ BodyCache per body
//!        ├─ body index (the body's primitives)
//!        └─ LinkCache per link
//!             └─ link index (the link's primitives)
//! ```
//!
//! Caches are built lazily, rebuilt whenever the geometry they were derived
//! from changes, and synchronized against the body's update stamp before
//! queries. [`ScopedIndexView`] composes temporary subsets of the
//! environment for a single query and restores it afterwards.

mod body_cache;
mod error;
mod link_cache;
mod manager;
mod scoped;

#[cfg(test)]
mod tests;

use std::cell::RefCell;
use std::rc::Rc;

use crate::broadphase::{BroadPhaseIndex, IndexFactory};
use crate::collision::{PrimitiveArena, PrimitiveFactory};
use crate::scene::BodyId;

pub use body_cache::{BodyCache, GeometrySubscription};
pub use error::SpaceError;
pub use link_cache::{CachedGeometry, LinkCache};
pub use manager::{SpaceManager, SynchronizeCallback};
pub use scoped::{ScopedIndexView, ViewPolicy};

/// Shared state borrowed from the manager while caches are (re)built
pub(crate) struct CacheContext<'a> {
    pub factory: &'a PrimitiveFactory,
    pub index_factory: &'a IndexFactory,
    pub primitives: &'a mut PrimitiveArena,
    pub environment: &'a mut dyn BroadPhaseIndex,
    pub group: &'a str,
    pub pending: &'a Rc<RefCell<Vec<BodyId>>>,
}

/// Replace `index` by an empty one from `factory` holding the same members
fn recreate_index(index: &mut Box<dyn BroadPhaseIndex>, factory: &IndexFactory) {
    let members = index.members();
    *index = factory.create();
    index.register_all(&members);
}
