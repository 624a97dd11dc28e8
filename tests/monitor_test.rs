//! Memory monitor accounting and pressure bands.

use hd_pager::memory::{MemoryMonitor, PressureThresholds};

#[test]
fn pressure_grows_with_usage() {
    let monitor = MemoryMonitor::new(1000, 500);
    let mut last = monitor.scene_memory_pressure();
    for _ in 0..10 {
        monitor.add_scene_memory(100);
        let now = monitor.scene_memory_pressure();
        assert!(now > last);
        last = now;
    }
    assert!((monitor.scene_memory_pressure() - 1.0).abs() < f32::EPSILON);
}

#[test]
fn reduce_clamps_at_zero() {
    let monitor = MemoryMonitor::new(1000, 500);
    monitor.add_renderer_memory(100);
    monitor.reduce_renderer_memory(400);

    assert_eq!(monitor.renderer_memory_used(), 0);
    assert_eq!(monitor.renderer_memory_pressure(), 0.0);
}

#[test]
fn available_never_underflows() {
    let monitor = MemoryMonitor::new(100, 100);
    monitor.add_scene_memory(250);

    assert_eq!(monitor.scene_memory_available(), 0);
    assert!(monitor.scene_memory_pressure() > 2.0);
}

#[test]
fn max_pressure_picks_the_fuller_tier() {
    let monitor = MemoryMonitor::new(1000, 100);
    monitor.add_scene_memory(300);
    monitor.add_renderer_memory(60);

    assert!((monitor.max_pressure() - 0.6).abs() < 1e-6);
}

#[test]
fn needs_paging_follows_thresholds() {
    let thresholds = PressureThresholds { moderate: 0.2, paging: 0.4, high: 0.6, very_high: 0.8 };
    let monitor = MemoryMonitor::with_thresholds(100, 100, thresholds);

    monitor.add_scene_memory(40);
    assert!(!monitor.needs_paging());

    monitor.add_renderer_memory(41);
    assert!(monitor.needs_paging());
    assert_eq!(monitor.thresholds(), &thresholds);
}

#[test]
fn tiers_are_independent() {
    let monitor = MemoryMonitor::new(1000, 1000);
    monitor.add_scene_memory(10);
    monitor.add_renderer_memory(20);
    monitor.reduce_scene_memory(10);

    assert_eq!(monitor.scene_memory_used(), 0);
    assert_eq!(monitor.renderer_memory_used(), 20);
}
