//! Buffer residency flags and usage classes.

use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    /// Tiers that currently hold a valid copy of a buffer.
    ///
    /// Any combination is representable. An empty set is only legal while a
    /// buffer is mid-transition or being destroyed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferState: u8 {
        /// Copy resident in scene (host) memory.
        const SCENE = 1 << 0;
        /// Copy resident in renderer memory.
        const RENDERER = 1 << 1;
        /// Copy persisted in a page file.
        const DISK = 1 << 2;
    }
}

impl BufferState {
    /// Tiers released by default when swapping scene memory out to disk.
    pub const SWAP_SCENE_TO_DISK: Self = Self::SCENE.union(Self::RENDERER);
    /// Tiers released by default when swapping renderer memory out to disk.
    pub const SWAP_RENDERER_TO_DISK: Self = Self::RENDERER;
    /// Tiers released by default when swapping into scene memory.
    pub const SWAP_TO_SCENE: Self = Self::RENDERER;
    /// Tiers released by default when swapping into renderer memory.
    pub const SWAP_TO_RENDERER: Self = Self::SCENE;

    /// True if at least one in-memory tier holds data.
    pub fn in_memory(&self) -> bool {
        self.intersects(Self::SCENE | Self::RENDERER)
    }
}

/// How a buffer is expected to be mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferUsage {
    /// Written once, read many times. Eligible for automatic paging.
    #[default]
    Static,
    /// Actively written. Never paged automatically.
    Dynamic,
}

impl BufferUsage {
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Self::Dynamic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_combinations_representable() {
        let all: Vec<BufferState> = (0u8..8).map(BufferState::from_bits_truncate).collect();
        assert_eq!(all.len(), 8);
        assert!(all[0].is_empty());
        assert_eq!(all[7], BufferState::all());
    }

    #[test]
    fn test_in_memory() {
        assert!(BufferState::SCENE.in_memory());
        assert!((BufferState::RENDERER | BufferState::DISK).in_memory());
        assert!(!BufferState::DISK.in_memory());
        assert!(!BufferState::empty().in_memory());
    }

    #[test]
    fn test_usage_default_is_static() {
        assert_eq!(BufferUsage::default(), BufferUsage::Static);
        assert!(BufferUsage::Dynamic.is_dynamic());
    }
}
