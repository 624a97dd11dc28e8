//! Memory tier accounting.
//!
//! Tracks bytes held in scene memory and renderer memory against their
//! configured ceilings. Counters are atomic; no lock is taken on update.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use crate::telemetry;

/// Pressure bands consulted by the paging strategies.
///
/// Values are fractions of the tier limit (`used / limit`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PressureThresholds {
    /// Pressure at which old buffers start to be paged out.
    pub moderate: f32,
    /// Pressure at which pressure-driven paging starts.
    pub paging: f32,
    /// Pressure at which paging is forced.
    pub high: f32,
    /// Pressure at which even the conservative policy acts.
    pub very_high: f32,
}

impl Default for PressureThresholds {
    fn default() -> Self {
        Self {
            moderate: 0.5,
            paging: 0.8,
            high: 0.9,
            very_high: 0.95,
        }
    }
}

/// Running byte totals for the two in-memory tiers.
#[derive(Debug)]
pub struct MemoryMonitor {
    scene_used: AtomicUsize,
    renderer_used: AtomicUsize,
    scene_limit: usize,
    renderer_limit: usize,
    thresholds: PressureThresholds,
}

impl MemoryMonitor {
    pub fn new(scene_limit: usize, renderer_limit: usize) -> Self {
        Self::with_thresholds(scene_limit, renderer_limit, PressureThresholds::default())
    }

    pub fn with_thresholds(
        scene_limit: usize,
        renderer_limit: usize,
        thresholds: PressureThresholds,
    ) -> Self {
        Self {
            scene_used: AtomicUsize::new(0),
            renderer_used: AtomicUsize::new(0),
            scene_limit,
            renderer_limit,
            thresholds,
        }
    }

    pub fn add_scene_memory(&self, bytes: usize) {
        let total = self.scene_used.fetch_add(bytes, Ordering::SeqCst) + bytes;
        telemetry::record_memory_usage(telemetry::SCENE_MEMORY_GAUGE, total);
    }

    /// Reduce the scene tally. Clamped at zero.
    pub fn reduce_scene_memory(&self, bytes: usize) {
        let total = saturating_reduce(&self.scene_used, bytes);
        telemetry::record_memory_usage(telemetry::SCENE_MEMORY_GAUGE, total);
    }

    pub fn add_renderer_memory(&self, bytes: usize) {
        let total = self.renderer_used.fetch_add(bytes, Ordering::SeqCst) + bytes;
        telemetry::record_memory_usage(telemetry::RENDERER_MEMORY_GAUGE, total);
    }

    /// Reduce the renderer tally. Clamped at zero.
    pub fn reduce_renderer_memory(&self, bytes: usize) {
        let total = saturating_reduce(&self.renderer_used, bytes);
        telemetry::record_memory_usage(telemetry::RENDERER_MEMORY_GAUGE, total);
    }

    pub fn scene_memory_used(&self) -> usize {
        self.scene_used.load(Ordering::SeqCst)
    }

    pub fn renderer_memory_used(&self) -> usize {
        self.renderer_used.load(Ordering::SeqCst)
    }

    pub fn scene_memory_limit(&self) -> usize {
        self.scene_limit
    }

    pub fn renderer_memory_limit(&self) -> usize {
        self.renderer_limit
    }

    pub fn scene_memory_available(&self) -> usize {
        self.scene_limit.saturating_sub(self.scene_memory_used())
    }

    pub fn renderer_memory_available(&self) -> usize {
        self.renderer_limit.saturating_sub(self.renderer_memory_used())
    }

    /// `used / limit` for scene memory. May exceed 1.0.
    pub fn scene_memory_pressure(&self) -> f32 {
        pressure(self.scene_memory_used(), self.scene_limit)
    }

    /// `used / limit` for renderer memory. May exceed 1.0.
    pub fn renderer_memory_pressure(&self) -> f32 {
        pressure(self.renderer_memory_used(), self.renderer_limit)
    }

    /// The higher of the two tier pressures.
    pub fn max_pressure(&self) -> f32 {
        self.scene_memory_pressure().max(self.renderer_memory_pressure())
    }

    pub fn thresholds(&self) -> &PressureThresholds {
        &self.thresholds
    }

    /// True if either tier is past the paging threshold.
    pub fn needs_paging(&self) -> bool {
        self.max_pressure() > self.thresholds.paging
    }
}

fn saturating_reduce(counter: &AtomicUsize, bytes: usize) -> usize {
    let previous = counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
            Some(used.saturating_sub(bytes))
        })
        .unwrap_or(0);
    previous.saturating_sub(bytes)
}

fn pressure(used: usize, limit: usize) -> f32 {
    if limit == 0 {
        return if used == 0 { 0.0 } else { f32::INFINITY };
    }
    (used as f64 / limit as f64) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_increases_pressure() {
        let monitor = MemoryMonitor::new(1000, 500);
        let before = monitor.scene_memory_pressure();
        monitor.add_scene_memory(100);
        assert!(monitor.scene_memory_pressure() > before);
        assert!((monitor.scene_memory_pressure() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_reduce_clamps_at_zero() {
        let monitor = MemoryMonitor::new(1000, 500);
        monitor.add_renderer_memory(100);
        monitor.reduce_renderer_memory(250);
        assert_eq!(monitor.renderer_memory_used(), 0);
        assert_eq!(monitor.renderer_memory_pressure(), 0.0);
    }

    #[test]
    fn test_pressure_can_exceed_one() {
        let monitor = MemoryMonitor::new(100, 100);
        monitor.add_scene_memory(250);
        assert!(monitor.scene_memory_pressure() > 2.0);
        assert_eq!(monitor.scene_memory_available(), 0);
        assert!(monitor.needs_paging());
    }

    #[test]
    fn test_zero_limit() {
        let monitor = MemoryMonitor::new(0, 0);
        assert_eq!(monitor.scene_memory_pressure(), 0.0);
        monitor.add_scene_memory(1);
        assert!(monitor.scene_memory_pressure().is_infinite());
    }

    #[test]
    fn test_tiers_are_independent() {
        let monitor = MemoryMonitor::new(1000, 1000);
        monitor.add_scene_memory(300);
        monitor.add_renderer_memory(700);
        assert_eq!(monitor.scene_memory_used(), 300);
        assert_eq!(monitor.renderer_memory_used(), 700);
        assert!((monitor.max_pressure() - 0.7).abs() < 1e-6);
    }
}
