//! `simulate`: run the allocate-fill-evict cycle against a scratch manager
//! and report memory pressure after each step.

use serde::Serialize;

use crate::paging::{
    BufferKey, BufferManager, BufferManagerConfig, BufferState, BufferUsage, CrawlReport,
    PageableBuffer, PagingError,
};

/// Pressure after one step of the simulation.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationStep {
    pub step: &'static str,
    pub buffers: usize,
    pub scene_pressure: f32,
    pub renderer_pressure: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    /// Bytes per simulated "MiB".
    pub unit: usize,
    pub steps: Vec<SimulationStep>,
    pub crawl: CrawlReport,
}

fn record(manager: &BufferManager, step: &'static str, steps: &mut Vec<SimulationStep>) {
    let monitor = manager.memory_monitor();
    steps.push(SimulationStep {
        step,
        buffers: manager.buffer_count(),
        scene_pressure: monitor.scene_memory_pressure(),
        renderer_pressure: monitor.renderer_memory_pressure(),
    });
}

fn key(i: usize) -> Result<BufferKey, PagingError> {
    BufferKey::new(format!("/simulation/buffer_{}", i)).map_err(|e| PagingError::Aborted(e.to_string()))
}

/// Run the cycle with `unit` bytes standing in for one MiB.
///
/// Limits are 512 and 256 units. Three buffers (50, 30, 100) move through
/// scene memory into renderer memory, ten more of 80 units land in renderer
/// memory, then a 90% crawl runs.
pub fn simulate(base: &BufferManagerConfig, unit: usize) -> Result<SimulationReport, PagingError> {
    let unit = unit.max(1);
    let config = BufferManagerConfig {
        scene_memory_limit: 512 * unit,
        renderer_memory_limit: 256 * unit,
        ..base.clone()
    };
    let manager = BufferManager::new(config)?;
    let mut steps = Vec::new();

    let initial: Vec<_> = [50usize, 30, 100]
        .iter()
        .enumerate()
        .map(|(i, size)| manager.create_buffer(key(i)?, size * unit, BufferUsage::Static))
        .collect::<Result<_, _>>()?;
    for buffer in &initial {
        buffer.page_to_scene_memory(false)?;
    }
    record(&manager, "scene", &mut steps);

    for buffer in &initial {
        buffer.swap_to_renderer_memory(false, BufferState::SWAP_TO_RENDERER)?;
    }
    record(&manager, "renderer", &mut steps);

    for i in 0..10 {
        let buffer = manager.create_buffer(key(initial.len() + i)?, 80 * unit, BufferUsage::Static)?;
        buffer.swap_to_renderer_memory(false, BufferState::SWAP_TO_RENDERER)?;
    }
    record(&manager, "overcommit", &mut steps);

    let crawl = manager.free_crawl(90.0);
    record(&manager, "crawl", &mut steps);

    Ok(SimulationReport { unit, steps, crawl })
}

/// Run the simulation and print the report as JSON.
pub fn run_simulate(base: &BufferManagerConfig, unit: usize) -> i32 {
    match simulate(base, unit) {
        Ok(report) => match serde_json::to_string_pretty(&report) {
            Ok(json) => {
                println!("{}", json);
                0
            }
            Err(e) => {
                eprintln!("ERROR: {}", e);
                1
            }
        },
        Err(e) => {
            eprintln!("Simulation failed: {}", e);
            1
        }
    }
}
