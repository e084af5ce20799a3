//! Shared registry for bind group layouts.

use const_fnv1a_hash::fnv1a_hash_str_64;
use nohash_hasher::IntMap;
use parking_lot::RwLock;
use std::fmt;

/// Identifier for a bind group layout in a [`BindGroupLayoutRegistry`],
/// computed by hashing a name at compile time.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct BindGroupLayoutID(u64);

/// A registry that creates each bind group layout once and hands out the same
/// layout to every later request with the same ID.
///
/// The registry is meant to be owned by a top-level component and passed by
/// reference to everything that needs the shared layouts, so that e.g. all
/// mesh materials bind their resources through one layout.
#[derive(Debug, Default)]
pub struct BindGroupLayoutRegistry {
    layouts: RwLock<IntMap<u64, wgpu::BindGroupLayout>>,
}

impl BindGroupLayoutID {
    /// Creates the ID for the layout with the given name.
    pub const fn from_name(name: &str) -> Self {
        Self(fnv1a_hash_str_64(name))
    }
}

impl fmt::Debug for BindGroupLayoutID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BindGroupLayoutID({:#018x})", self.0)
    }
}

impl BindGroupLayoutRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the layout with the given ID, calling the given function to
    /// create it if it does not already exist.
    pub fn get_or_create_layout<F>(&self, id: BindGroupLayoutID, create_fn: F) -> wgpu::BindGroupLayout
    where
        F: FnOnce() -> wgpu::BindGroupLayout,
    {
        if let Some(layout) = self.layouts.read().get(&id.0) {
            return layout.clone();
        }

        let mut layouts = self.layouts.write();

        // Another thread may have created it while we waited for the lock
        if let Some(layout) = layouts.get(&id.0) {
            return layout.clone();
        }

        log::debug!("Creating bind group layout {id:?}");

        let layout = create_fn();
        layouts.insert(id.0, layout.clone());
        layout
    }

    /// Returns the layout with the given ID if it exists.
    pub fn get_layout(&self, id: BindGroupLayoutID) -> Option<wgpu::BindGroupLayout> {
        self.layouts.read().get(&id.0).cloned()
    }

    /// Returns the number of layouts in the registry.
    pub fn n_layouts(&self) -> usize {
        self.layouts.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_give_equal_ids_for_equal_names() {
        assert_eq!(
            BindGroupLayoutID::from_name("material"),
            BindGroupLayoutID::from_name("material")
        );
        assert_ne!(
            BindGroupLayoutID::from_name("material"),
            BindGroupLayoutID::from_name("geometry")
        );
    }

    #[test]
    fn should_start_out_empty() {
        let registry = BindGroupLayoutRegistry::new();
        assert_eq!(registry.n_layouts(), 0);
        assert!(
            registry
                .get_layout(BindGroupLayoutID::from_name("material"))
                .is_none()
        );
    }
}
