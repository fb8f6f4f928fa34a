//! Temporary index views for a single query
//!
//! A [`ScopedIndexView`] mutably borrows the [`SpaceManager`], so nothing else
//! can touch the environment index until the view is released or dropped.
//! On release the environment index gets back exactly the members it lost,
//! with the same keys; nothing is rebuilt.

use crate::broadphase::{BroadPhaseIndex, Proxy};
use crate::collision::PrimitiveKey;
use crate::scene::BodyId;

use super::manager::SpaceManager;
use super::SpaceError;

/// What a view does to the environment index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewPolicy {
    /// Registered primitives move from the environment into the view's own index
    Borrow,
    /// Registered primitives are copied into the view's own index
    Wrap,
    /// Registered primitives leave the environment, which is what the view exposes
    Exclude,
}

impl ViewPolicy {
    fn owns_index(self) -> bool {
        !matches!(self, Self::Exclude)
    }

    fn removes_from_environment(self) -> bool {
        !matches!(self, Self::Wrap)
    }
}

/// Composed subset of the environment index, restored on drop
#[derive(Debug)]
pub struct ScopedIndexView<'a> {
    space: &'a mut SpaceManager,
    policy: ViewPolicy,
    index: Box<dyn BroadPhaseIndex>,
    removed: Vec<Proxy>,
}

impl<'a> ScopedIndexView<'a> {
    pub(super) fn new(space: &'a mut SpaceManager, policy: ViewPolicy) -> Self {
        // Registered bodies must contribute their current primitives
        space.process_geometry_changes();
        let index = space.index_factory().create();
        log::trace!("Opening {policy:?} view");
        Self {
            space,
            policy,
            index,
            removed: Vec::new(),
        }
    }

    /// Policy of this view
    pub fn policy(&self) -> ViewPolicy {
        self.policy
    }

    /// Read access to the space while the view is open
    pub fn space(&self) -> &SpaceManager {
        &*self.space
    }

    /// Add every primitive of an initialized body
    pub fn register_body(&mut self, body: BodyId) -> Result<(), SpaceError> {
        let proxies = self.space.body_index(body)?.members();
        self.absorb(proxies);
        Ok(())
    }

    /// Add every primitive of one link of an initialized body
    pub fn register_link(&mut self, body: BodyId, link: usize) -> Result<(), SpaceError> {
        let proxies = self.space.link_index(body, link)?.members();
        self.absorb(proxies);
        Ok(())
    }

    fn absorb(&mut self, proxies: Vec<Proxy>) {
        if self.policy.owns_index() {
            self.index.register_all(&proxies);
        }
        if self.policy.removes_from_environment() {
            let environment = self.space.environment_mut();
            for proxy in proxies {
                if environment.unregister(proxy.key) {
                    self.removed.push(proxy);
                }
            }
        }
    }

    /// Index to run the query against
    ///
    /// For [`ViewPolicy::Exclude`] this is the shrunk environment index.
    pub fn view(&self) -> &dyn BroadPhaseIndex {
        match self.policy {
            ViewPolicy::Borrow | ViewPolicy::Wrap => self.index.as_ref(),
            ViewPolicy::Exclude => self.space.environment_index(),
        }
    }

    /// Keys currently held out of the environment index
    pub fn removed(&self) -> Vec<PrimitiveKey> {
        self.removed.iter().map(|proxy| proxy.key).collect()
    }

    /// Number of primitives currently held out of the environment index
    pub fn removed_count(&self) -> usize {
        self.removed.len()
    }

    /// Close the view, restoring the environment index
    pub fn release(mut self) {
        self.restore();
    }

    fn restore(&mut self) {
        if self.removed.is_empty() {
            return;
        }
        let environment = self.space.environment_mut();
        for proxy in self.removed.drain(..) {
            environment.register(proxy);
        }
    }
}

impl Drop for ScopedIndexView<'_> {
    fn drop(&mut self) {
        self.restore();
    }
}
