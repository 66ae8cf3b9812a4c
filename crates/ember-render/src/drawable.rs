//! Drawable entries and the per-frame draw batch.

use ember_core::{MaterialHandle, MeshHandle};
use glam::Mat4;

/// One mesh drawn with one material at one transform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Drawable {
    pub mesh: MeshHandle,
    pub material: MaterialHandle,
    pub model: Mat4,
}

impl Drawable {
    pub const fn new(mesh: MeshHandle, material: MaterialHandle, model: Mat4) -> Self {
        Self {
            mesh,
            material,
            model,
        }
    }
}

/// Ordered sequence of drawables recorded each tick.
///
/// The order is the recording order. Consecutive entries sharing a material or
/// mesh skip the redundant bind, so grouping them is cheaper but never required.
#[derive(Clone, Debug, Default)]
pub struct DrawBatch {
    entries: Vec<Drawable>,
}

impl DrawBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, drawable: Drawable) {
        self.entries.push(drawable);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Drawable> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[Drawable] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Group entries by material, then mesh. The sort is stable, so entries
    /// with equal keys keep their relative order.
    pub fn sort_for_binding(&mut self) {
        self.entries.sort_by_key(|d| (d.material, d.mesh));
    }
}

impl FromIterator<Drawable> for DrawBatch {
    fn from_iter<I: IntoIterator<Item = Drawable>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl Extend<Drawable> for DrawBatch {
    fn extend<I: IntoIterator<Item = Drawable>>(&mut self, iter: I) {
        self.entries.extend(iter);
    }
}

impl<'a> IntoIterator for &'a DrawBatch {
    type Item = &'a Drawable;
    type IntoIter = std::slice::Iter<'a, Drawable>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
