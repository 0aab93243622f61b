//! Viewer session state.
//!
//! Owns the loaded model, the load/dispose sequencing, toolbar toggles and
//! selection handling. The window shell in `main.rs` translates raw input
//! into [`ToolbarAction`]s and drop events into [`ModelSource`]s; everything
//! stateful happens here.

use instant::Instant;
use winit::keyboard::KeyCode;
use winit::window::Window;

use crate::camera::CameraPreset;
use crate::config::ViewerConfig;
use crate::disposer;
use crate::engine::EngineHandle;
use crate::loader::{CancelToken, LoadError, LoadOptions, ModelLoader, SceneJournal, ScenePort};
use crate::model::{LoadedModel, ModelSource};
use crate::optimizer::QualityOptimizer;
use crate::picking::{PickOutcome, classify_pick};
use crate::scene::SceneContext;
use crate::telemetry::FrameTiming;

/// Everything the toolbar can do, decoupled from the key bindings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolbarAction {
    ToggleGrid,
    ToggleAxes,
    ToggleGizmo,
    ToggleOptimizer,
    ToggleUi,
    ToggleInspector,
    Preset(CameraPreset),
    FitToView,
    ClearSelection,
}

/// Key bindings: G grid, A axes, T gizmo, O optimizer, H UI, I inspector,
/// 1-6 camera presets, F fit-to-view, Esc clear selection (or cancel an
/// in-flight load).
pub fn action_for_key(key: KeyCode) -> Option<ToolbarAction> {
    match key {
        KeyCode::KeyG => Some(ToolbarAction::ToggleGrid),
        KeyCode::KeyA => Some(ToolbarAction::ToggleAxes),
        KeyCode::KeyT => Some(ToolbarAction::ToggleGizmo),
        KeyCode::KeyO => Some(ToolbarAction::ToggleOptimizer),
        KeyCode::KeyH => Some(ToolbarAction::ToggleUi),
        KeyCode::KeyI => Some(ToolbarAction::ToggleInspector),
        KeyCode::KeyF => Some(ToolbarAction::FitToView),
        KeyCode::Digit1 => Some(ToolbarAction::Preset(CameraPreset::Front)),
        KeyCode::Digit2 => Some(ToolbarAction::Preset(CameraPreset::Back)),
        KeyCode::Digit3 => Some(ToolbarAction::Preset(CameraPreset::Left)),
        KeyCode::Digit4 => Some(ToolbarAction::Preset(CameraPreset::Right)),
        KeyCode::Digit5 => Some(ToolbarAction::Preset(CameraPreset::Top)),
        KeyCode::Digit6 => Some(ToolbarAction::Preset(CameraPreset::Isometric)),
        KeyCode::Escape => Some(ToolbarAction::ClearSelection),
        _ => None,
    }
}

/// Case-insensitive check against the accepted drop extension.
pub fn validate_extension(name: &str, accepted: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    std::path::Path::new(&lower)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext == accepted)
        .unwrap_or(false)
}

/// A dispose-then-load cycle running on the runtime. The receiver side
/// lives here; the task reports back exactly once.
struct PendingLoad {
    receiver: tokio::sync::oneshot::Receiver<(Result<LoadedModel, LoadError>, SceneJournal)>,
}

pub struct ViewerSession {
    pub config: ViewerConfig,
    pub optimizer: QualityOptimizer,
    pub frame_timing: FrameTiming,
    pub model: Option<LoadedModel>,
    pending: Option<PendingLoad>,
    cancel: CancelToken,
    pub show_ui: bool,
    inspector: bool,
}

impl ViewerSession {
    pub fn new(config: ViewerConfig) -> Self {
        Self {
            optimizer: QualityOptimizer::new(config.optimizer_target_fps),
            frame_timing: FrameTiming::new("bimview"),
            model: None,
            pending: None,
            cancel: CancelToken::new(),
            show_ui: true,
            inspector: false,
            config,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    /// Accept or reject a dropped file by name.
    pub fn accepts_file(&self, name: &str) -> bool {
        validate_extension(name, self.config.accepted_extension)
    }

    /// Dispose the current model (if any) and load a replacement, as one
    /// task spawned on the runtime so the event loop keeps pumping frames.
    /// Loads are serialized: a request while one is in flight is dropped
    /// with a warning rather than queued. The result is picked up by
    /// [`Self::poll_load`].
    pub fn replace_model(
        &mut self,
        runtime: &tokio::runtime::Handle,
        engine: &EngineHandle,
        scene: &mut SceneContext,
        source: ModelSource,
    ) {
        if self.pending.is_some() {
            log::warn!("a model load is already in progress, ignoring '{}'", source.label());
            return;
        }

        // scene-side prep happens here, on the loop: the task only touches
        // the old model's resources and the journal
        scene.set_selection(self.model.as_ref(), None);
        self.optimizer.stop();
        let prior = self.model.take();

        self.cancel = CancelToken::new();
        let mut loader = ModelLoader::with_token(self.config.clone(), self.cancel.clone());
        let options = LoadOptions::from_config(&self.config);
        let upload = scene.upload_context();
        let flush = engine.flush_handle();
        let name = source.label();
        let (sender, receiver) = tokio::sync::oneshot::channel();

        runtime.spawn(async move {
            let mut journal = SceneJournal::default();
            if let Some(prior) = prior {
                disposer::release_model(Some(&flush), &mut journal, prior).await;
            }

            let mut last_logged = 0u32;
            let result = loader.load(source, &options, Some(&upload), &mut journal, &mut |progress| {
                let decile = (progress * 10.0) as u32;
                if decile > last_logged {
                    last_logged = decile;
                    log::info!("loading {name}: {:.0}%", progress * 100.0);
                }
            });
            if result.is_err() {
                // partially uploaded buffers drop with the loader's locals;
                // a flush lets the backend reclaim them now
                flush.flush();
            }
            let _ = sender.send((result, journal));
        });

        self.pending = Some(PendingLoad { receiver });
    }

    /// Non-blocking check for a finished load task; called once per frame.
    /// On success the journal is replayed onto the scene and the model goes
    /// live in the same step.
    pub fn poll_load(&mut self, scene: &mut SceneContext) {
        let Some(pending) = &mut self.pending else {
            return;
        };
        let outcome = match pending.receiver.try_recv() {
            Err(tokio::sync::oneshot::error::TryRecvError::Empty) => return,
            Err(tokio::sync::oneshot::error::TryRecvError::Closed) => {
                self.pending = None;
                log::error!("model load task vanished without a result");
                return;
            }
            Ok(outcome) => outcome,
        };
        self.pending = None;

        match outcome {
            (Ok(model), journal) => {
                journal.replay(scene, &model.meshes);
                if self.inspector {
                    model.report.log(&model.name, &model.stats);
                }
                self.optimizer.start();
                self.model = Some(model);
            }
            (Err(LoadError::Cancelled), journal) => {
                journal.replay(scene, &[]);
                log::info!("model load cancelled");
            }
            (Err(error), journal) => {
                journal.replay(scene, &[]);
                log::error!("model load failed: {error}");
            }
        }
    }

    /// Resolve a raw pick id into a selection change.
    pub fn handle_pick(&mut self, scene: &mut SceneContext, id: u32) {
        match classify_pick(id) {
            PickOutcome::Miss => scene.set_selection(self.model.as_ref(), None),
            PickOutcome::Helper(_) => {}
            PickOutcome::Mesh(id) => scene.set_selection(self.model.as_ref(), Some(id)),
        }
    }

    pub fn handle_action(&mut self, scene: &mut SceneContext, action: ToolbarAction) {
        match action {
            ToolbarAction::ToggleGrid => scene.ground.visible = !scene.ground.visible,
            ToolbarAction::ToggleAxes => scene.axes.visible = !scene.axes.visible,
            ToolbarAction::ToggleGizmo => {
                scene.gizmo_enabled = !scene.gizmo_enabled;
                scene.gizmo.visible = scene.gizmo_enabled && scene.selected.is_some();
            }
            ToolbarAction::ToggleOptimizer => self.optimizer.toggle(),
            ToolbarAction::ToggleUi => self.show_ui = !self.show_ui,
            ToolbarAction::ToggleInspector => {
                self.inspector = !self.inspector;
                if self.inspector {
                    if let Some(model) = &self.model {
                        model.report.log(&model.name, &model.stats);
                    }
                }
            }
            ToolbarAction::Preset(preset) => scene.camera.camera.apply_preset(preset),
            ToolbarAction::FitToView => {
                if let Some(model) = &self.model {
                    let bounds = model.stats.bounding_box;
                    scene.frame_camera(&bounds);
                }
            }
            ToolbarAction::ClearSelection => {
                if self.pending.is_some() {
                    log::info!("cancelling model load");
                    self.cancel.cancel();
                } else {
                    scene.set_selection(self.model.as_ref(), None);
                }
            }
        }
    }

    /// Per-frame bookkeeping after a presented frame.
    pub fn frame_presented(&mut self, window: Option<&Window>, scene: &mut SceneContext) {
        let title_target = if self.show_ui { window } else { None };
        self.frame_timing.frame_presented(title_target, Instant::now());
        if let Some(level) = self.optimizer.observe(self.frame_timing.frame_dt) {
            scene.apply_quality(level);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_check_is_case_insensitive_and_suffix_only() {
        assert!(validate_extension("building.glb", "glb"));
        assert!(validate_extension("BUILDING.GLB", "glb"));
        assert!(validate_extension("site.export.glb", "glb"));
        assert!(!validate_extension("building.gltf", "glb"));
        assert!(!validate_extension("building.glb.txt", "glb"));
        assert!(!validate_extension("glb", "glb"));
        assert!(!validate_extension("", "glb"));
    }

    #[test]
    fn every_toolbar_key_maps_to_a_distinct_action() {
        let keys = [
            KeyCode::KeyG,
            KeyCode::KeyA,
            KeyCode::KeyT,
            KeyCode::KeyO,
            KeyCode::KeyH,
            KeyCode::KeyI,
            KeyCode::KeyF,
            KeyCode::Digit1,
            KeyCode::Digit2,
            KeyCode::Digit3,
            KeyCode::Digit4,
            KeyCode::Digit5,
            KeyCode::Digit6,
            KeyCode::Escape,
        ];
        let mut actions: Vec<ToolbarAction> =
            keys.iter().map(|key| action_for_key(*key).unwrap()).collect();
        let before = actions.len();
        actions.dedup();
        assert_eq!(actions.len(), before);
        assert_eq!(action_for_key(KeyCode::KeyQ), None);
    }

    #[test]
    fn session_accepts_only_the_configured_extension() {
        let session = ViewerSession::new(ViewerConfig::default());
        assert!(session.accepts_file("tower.glb"));
        assert!(!session.accepts_file("tower.obj"));
        assert!(!session.is_loading());
    }
}
