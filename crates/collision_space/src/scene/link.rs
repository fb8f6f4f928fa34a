//! Links of a kinematic body

use std::collections::HashMap;

use super::geometry::GeometryInfo;

/// A rigid link carrying geometry
///
/// Besides its default geometry list a link may carry named alternate lists
/// ("geometry groups"), e.g. a coarse self-collision set.
#[derive(Debug, Clone, Default)]
pub struct Link {
    index: usize,
    name: String,
    geometries: Vec<GeometryInfo>,
    groups: HashMap<String, Vec<GeometryInfo>>,
}

impl Link {
    /// Creates a link with a default geometry list; the index is assigned by the body
    pub fn new(name: impl Into<String>, geometries: Vec<GeometryInfo>) -> Self {
        Self {
            index: 0,
            name: name.into(),
            geometries,
            groups: HashMap::new(),
        }
    }

    /// Builder-style helper adding a named geometry group
    pub fn with_group(mut self, group: impl Into<String>, geometries: Vec<GeometryInfo>) -> Self {
        self.groups.insert(group.into(), geometries);
        self
    }

    /// Position of this link in its body's link list
    pub fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn set_index(&mut self, index: usize) {
        self.index = index;
    }

    /// Link name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Default geometry list
    pub fn geometries(&self) -> &[GeometryInfo] {
        &self.geometries
    }

    /// Geometry list of a named group, if the link has that group
    pub fn group_geometries(&self, group: &str) -> Option<&[GeometryInfo]> {
        self.groups.get(group).map(Vec::as_slice)
    }

    /// Geometry used for collision under `group`
    ///
    /// An empty name, or a name this link does not define, selects the
    /// default list.
    pub fn geometries_for_group(&self, group: &str) -> &[GeometryInfo] {
        if group.is_empty() {
            return &self.geometries;
        }
        self.group_geometries(group).unwrap_or(&self.geometries)
    }

    pub(crate) fn replace_geometries(&mut self, group: Option<&str>, geometries: Vec<GeometryInfo>) {
        match group {
            Some(name) if !name.is_empty() => {
                self.groups.insert(name.to_string(), geometries);
            }
            _ => self.geometries = geometries,
        }
    }
}
