//! Paging strategy decisions.

use hd_pager::memory::PressureThresholds;
use hd_pager::paging::{
    AgeBasedStrategy, BufferState, BufferUsage, ConservativeStrategy, HybridStrategy,
    PagingAction, PagingContext, PagingDecision, PagingStrategy, PagingStrategyKind,
    PressureBasedStrategy,
};

fn ctx(scene: f32, renderer: f32, age: u64, state: BufferState, usage: BufferUsage) -> PagingContext {
    PagingContext {
        current_frame: 1000,
        frame_stamp: 1000u64.saturating_sub(age),
        age_limit: 100,
        scene_pressure: scene,
        renderer_pressure: renderer,
        usage,
        state,
        thresholds: PressureThresholds::default(),
    }
}

fn all_strategies() -> Vec<Box<dyn PagingStrategy>> {
    vec![
        Box::new(AgeBasedStrategy),
        Box::new(PressureBasedStrategy),
        Box::new(ConservativeStrategy),
        Box::new(HybridStrategy),
    ]
}

#[test]
fn dynamic_buffers_are_never_paged() {
    let states = [
        BufferState::SCENE,
        BufferState::RENDERER,
        BufferState::SCENE | BufferState::RENDERER,
        BufferState::RENDERER | BufferState::DISK,
    ];
    for strategy in all_strategies() {
        for state in states {
            for (scene, renderer) in [(0.0, 0.0), (0.6, 0.6), (0.99, 0.99), (3.0, 3.0)] {
                let decision =
                    strategy.decide(&ctx(scene, renderer, 900, state, BufferUsage::Dynamic));
                assert_eq!(decision, PagingDecision::NONE, "{} {:?}", strategy.name(), state);
            }
        }
    }
}

#[test]
fn no_action_means_no_paging() {
    for strategy in all_strategies() {
        for (scene, renderer, age) in [(0.0, 0.0, 0), (0.99, 0.99, 900), (0.6, 0.1, 500)] {
            let d = strategy.decide(&ctx(scene, renderer, age, BufferState::SCENE, BufferUsage::Static));
            assert_eq!(d.should_page, d.action != PagingAction::None);
        }
    }
}

#[test]
fn age_strategy_prefers_renderer() {
    let both = BufferState::SCENE | BufferState::RENDERER;
    let d = AgeBasedStrategy.decide(&ctx(0.0, 0.0, 101, both, BufferUsage::Static));
    assert_eq!(d, PagingDecision::recommend(PagingAction::SwapRendererToDisk, false));

    let d = AgeBasedStrategy.decide(&ctx(0.0, 0.0, 100, both, BufferUsage::Static));
    assert!(!d.should_page);
}

#[test]
fn pressure_strategy_forces_in_high_band() {
    let d = PressureBasedStrategy.decide(&ctx(0.85, 0.0, 0, BufferState::SCENE, BufferUsage::Static));
    assert_eq!(d, PagingDecision::recommend(PagingAction::SwapSceneToDisk, false));

    let d = PressureBasedStrategy.decide(&ctx(0.92, 0.0, 0, BufferState::SCENE, BufferUsage::Static));
    assert_eq!(d, PagingDecision::recommend(PagingAction::SwapSceneToDisk, true));
}

#[test]
fn pressure_strategy_relieves_renderer() {
    let renderer_only = BufferState::RENDERER;
    let d = PressureBasedStrategy.decide(&ctx(0.1, 0.85, 0, renderer_only, BufferUsage::Static));
    assert_eq!(d.action, PagingAction::SwapToSceneMemory);

    let both = BufferState::SCENE | BufferState::RENDERER;
    let d = PressureBasedStrategy.decide(&ctx(0.1, 0.85, 0, both, BufferUsage::Static));
    assert_eq!(d.action, PagingAction::ReleaseRendererBuffer);

    let backed = BufferState::RENDERER | BufferState::DISK;
    let d = PressureBasedStrategy.decide(&ctx(0.1, 0.95, 0, backed, BufferUsage::Static));
    assert_eq!(d, PagingDecision::recommend(PagingAction::SwapRendererToDisk, true));
}

#[test]
fn conservative_waits_for_double_age() {
    let scene = BufferState::SCENE;
    assert!(!ConservativeStrategy.decide(&ctx(0.99, 0.0, 200, scene, BufferUsage::Static)).should_page);
    assert!(!ConservativeStrategy.decide(&ctx(0.9, 0.0, 500, scene, BufferUsage::Static)).should_page);

    let d = ConservativeStrategy.decide(&ctx(0.99, 0.0, 201, scene, BufferUsage::Static));
    assert_eq!(d, PagingDecision::recommend(PagingAction::SwapSceneToDisk, false));
}

#[test]
fn hybrid_switches_on_bands() {
    let scene = BufferState::SCENE;
    assert!(!HybridStrategy.decide(&ctx(0.4, 0.0, 500, scene, BufferUsage::Static)).should_page);

    let d = HybridStrategy.decide(&ctx(0.6, 0.0, 500, scene, BufferUsage::Static));
    assert_eq!(d, PagingDecision::recommend(PagingAction::SwapSceneToDisk, false));
    assert!(!HybridStrategy.decide(&ctx(0.6, 0.0, 50, scene, BufferUsage::Static)).should_page);

    let d = HybridStrategy.decide(&ctx(0.95, 0.0, 0, scene, BufferUsage::Static));
    assert_eq!(d, PagingDecision::recommend(PagingAction::SwapSceneToDisk, true));
}

#[test]
fn kinds_build_matching_strategies() {
    for kind in [
        PagingStrategyKind::Age,
        PagingStrategyKind::Pressure,
        PagingStrategyKind::Conservative,
        PagingStrategyKind::Hybrid,
    ] {
        assert_eq!(kind.build().name(), kind.as_str());
        assert_eq!(kind.to_string().parse::<PagingStrategyKind>().unwrap(), kind);
    }
}
