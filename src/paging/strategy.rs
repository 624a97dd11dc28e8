//! Paging strategies.
//!
//! A strategy looks at one buffer's [`PagingContext`] and recommends at most
//! one [`PagingAction`]. Strategies never touch buffers themselves; the
//! caller executes the decision with [`PagingAction::execute`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::buffer::PageableBuffer;
use super::error::PagingError;
use super::state::{BufferState, BufferUsage};
use crate::memory::{MemoryMonitor, PressureThresholds};

/// Transitions a strategy may recommend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PagingAction {
    None,
    SwapSceneToDisk,
    SwapRendererToDisk,
    SwapToSceneMemory,
    ReleaseRendererBuffer,
}

impl PagingAction {
    /// Run the action on `buffer` with each swap's default release mask.
    pub fn execute<B>(self, buffer: &B, force: bool) -> Result<(), PagingError>
    where
        B: PageableBuffer + ?Sized,
    {
        match self {
            Self::None => Ok(()),
            Self::SwapSceneToDisk => buffer.swap_scene_to_disk(force, BufferState::SWAP_SCENE_TO_DISK),
            Self::SwapRendererToDisk => {
                buffer.swap_renderer_to_disk(force, BufferState::SWAP_RENDERER_TO_DISK)
            }
            Self::SwapToSceneMemory => buffer.swap_to_scene_memory(force, BufferState::SWAP_TO_SCENE),
            Self::ReleaseRendererBuffer => {
                buffer.release_renderer_buffer();
                Ok(())
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::SwapSceneToDisk => "swap_scene_to_disk",
            Self::SwapRendererToDisk => "swap_renderer_to_disk",
            Self::SwapToSceneMemory => "swap_to_scene_memory",
            Self::ReleaseRendererBuffer => "release_renderer_buffer",
        }
    }
}

/// A strategy's recommendation for one buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingDecision {
    pub should_page: bool,
    pub force: bool,
    pub action: PagingAction,
}

impl PagingDecision {
    /// Leave the buffer alone.
    pub const NONE: Self = Self { should_page: false, force: false, action: PagingAction::None };

    pub fn recommend(action: PagingAction, force: bool) -> Self {
        Self { should_page: action != PagingAction::None, force, action }
    }
}

impl Default for PagingDecision {
    fn default() -> Self {
        Self::NONE
    }
}

/// Everything a strategy may look at when deciding.
#[derive(Debug, Clone, Copy)]
pub struct PagingContext {
    pub current_frame: u64,
    pub frame_stamp: u64,
    pub age_limit: u64,
    pub scene_pressure: f32,
    pub renderer_pressure: f32,
    pub usage: BufferUsage,
    pub state: BufferState,
    pub thresholds: PressureThresholds,
}

impl PagingContext {
    /// Snapshot `buffer` and current memory pressure.
    pub fn capture<B>(buffer: &B, current_frame: u64, age_limit: u64, monitor: &MemoryMonitor) -> Self
    where
        B: PageableBuffer + ?Sized,
    {
        Self {
            current_frame,
            frame_stamp: buffer.frame_stamp(),
            age_limit,
            scene_pressure: monitor.scene_memory_pressure(),
            renderer_pressure: monitor.renderer_memory_pressure(),
            usage: buffer.usage(),
            state: buffer.state(),
            thresholds: *monitor.thresholds(),
        }
    }

    /// Frames since the buffer was last touched.
    pub fn age(&self) -> u64 {
        self.current_frame.saturating_sub(self.frame_stamp)
    }

    pub fn is_over_age(&self) -> bool {
        self.age() > self.age_limit
    }

    fn has(&self, tier: BufferState) -> bool {
        self.state.contains(tier)
    }
}

/// Decides what, if anything, should happen to a buffer.
pub trait PagingStrategy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn decide(&self, ctx: &PagingContext) -> PagingDecision;
}

/// Pages out buffers that have not been touched for longer than the age limit.
#[derive(Debug, Clone, Copy, Default)]
pub struct AgeBasedStrategy;

impl PagingStrategy for AgeBasedStrategy {
    fn name(&self) -> &'static str {
        "age"
    }

    fn decide(&self, ctx: &PagingContext) -> PagingDecision {
        if ctx.usage.is_dynamic() || !ctx.is_over_age() {
            return PagingDecision::NONE;
        }
        if ctx.has(BufferState::RENDERER) {
            PagingDecision::recommend(PagingAction::SwapRendererToDisk, false)
        } else if ctx.has(BufferState::SCENE) {
            PagingDecision::recommend(PagingAction::SwapSceneToDisk, false)
        } else {
            PagingDecision::NONE
        }
    }
}

/// Relieves whichever tier is above the paging threshold, scene first.
/// Forces when that tier is in the high band.
#[derive(Debug, Clone, Copy, Default)]
pub struct PressureBasedStrategy;

impl PagingStrategy for PressureBasedStrategy {
    fn name(&self) -> &'static str {
        "pressure"
    }

    fn decide(&self, ctx: &PagingContext) -> PagingDecision {
        if ctx.usage.is_dynamic() {
            return PagingDecision::NONE;
        }
        let t = &ctx.thresholds;
        if ctx.scene_pressure > t.paging && ctx.has(BufferState::SCENE) {
            let force = ctx.scene_pressure > t.high;
            return PagingDecision::recommend(PagingAction::SwapSceneToDisk, force);
        }
        if ctx.renderer_pressure > t.paging && ctx.has(BufferState::RENDERER) {
            let force = ctx.renderer_pressure > t.high;
            let action = if ctx.has(BufferState::DISK) || ctx.scene_pressure > t.high {
                PagingAction::SwapRendererToDisk
            } else {
                relieve_renderer_into_scene(ctx)
            };
            return PagingDecision::recommend(action, force);
        }
        PagingDecision::NONE
    }
}

/// Acts only on buffers past twice the age limit while a tier is in the
/// very-high band. Never forces and never writes renderer data to disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConservativeStrategy;

impl PagingStrategy for ConservativeStrategy {
    fn name(&self) -> &'static str {
        "conservative"
    }

    fn decide(&self, ctx: &PagingContext) -> PagingDecision {
        if ctx.usage.is_dynamic() || ctx.age() <= ctx.age_limit.saturating_mul(2) {
            return PagingDecision::NONE;
        }
        let very_high = ctx.thresholds.very_high;
        if ctx.scene_pressure > very_high && ctx.has(BufferState::SCENE) {
            return PagingDecision::recommend(PagingAction::SwapSceneToDisk, false);
        }
        if ctx.renderer_pressure > very_high && ctx.has(BufferState::RENDERER) {
            return PagingDecision::recommend(relieve_renderer_into_scene(ctx), false);
        }
        PagingDecision::NONE
    }
}

/// Pressure-based above the paging threshold, age-based in the moderate
/// band, idle below it.
#[derive(Debug, Clone, Copy, Default)]
pub struct HybridStrategy;

impl PagingStrategy for HybridStrategy {
    fn name(&self) -> &'static str {
        "hybrid"
    }

    fn decide(&self, ctx: &PagingContext) -> PagingDecision {
        let t = &ctx.thresholds;
        let peak = ctx.scene_pressure.max(ctx.renderer_pressure);
        if peak > t.paging {
            PressureBasedStrategy.decide(ctx)
        } else if peak > t.moderate && ctx.is_over_age() {
            AgeBasedStrategy.decide(ctx)
        } else {
            PagingDecision::NONE
        }
    }
}

fn relieve_renderer_into_scene(ctx: &PagingContext) -> PagingAction {
    if ctx.has(BufferState::SCENE) {
        // Scene already holds the bytes.
        PagingAction::ReleaseRendererBuffer
    } else {
        PagingAction::SwapToSceneMemory
    }
}

/// Configurable choice of built-in strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PagingStrategyKind {
    Age,
    Pressure,
    Conservative,
    #[default]
    Hybrid,
}

impl PagingStrategyKind {
    pub fn build(self) -> Box<dyn PagingStrategy> {
        match self {
            Self::Age => Box::new(AgeBasedStrategy),
            Self::Pressure => Box::new(PressureBasedStrategy),
            Self::Conservative => Box::new(ConservativeStrategy),
            Self::Hybrid => Box::new(HybridStrategy),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Age => "age",
            Self::Pressure => "pressure",
            Self::Conservative => "conservative",
            Self::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for PagingStrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PagingStrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "age" => Ok(Self::Age),
            "pressure" => Ok(Self::Pressure),
            "conservative" => Ok(Self::Conservative),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(format!("unknown paging strategy: {}", other)),
        }
    }
}
