//! bimview
//!
//! A drag-and-drop viewer for GLB building-model exports. The crate is an
//! orchestration layer over wgpu: it selects a rendering backend (with
//! fallback), builds and tears down the scene (camera, lights, shadows,
//! ground grid, selection highlighting), runs the model-loading pipeline
//! with a per-phase timing breakdown, and reclaims GPU resources before a
//! replacement model is loaded.
//!
//! High-level modules
//! - `config`: compile-time viewer tunables
//! - `engine`: backend probing, fallback and the device/queue handle
//! - `scene`: scene lifecycle (build in dependency order, dispose in reverse)
//! - `camera`: orbital camera, auto-framing and zoom/pan sensitivity scaling
//! - `model`: model sources, mesh entities, materials, stats and bounds
//! - `loader`: the GLB load pipeline (import, materials, shadows, stats,
//!   centering, fit-to-view, freeze) with progress and cancellation
//! - `disposer`: deduplicated, ordered release of meshes/materials/textures
//! - `optimizer`: auto-quality control loop targeting a frame rate
//! - `picking`: GPU id-buffer picking for element selection
//! - `pipelines`: wgpu render pipelines and shaders
//! - `telemetry`: frame timing and load timing breakdowns
//! - `viewer`: the viewer session (toolbar state, drop validation,
//!   serialized load/dispose)

pub mod camera;
pub mod config;
pub mod disposer;
pub mod engine;
pub mod loader;
pub mod model;
pub mod optimizer;
pub mod picking;
pub mod pipelines;
pub mod scene;
pub mod telemetry;
pub mod texture;
pub mod viewer;

pub use config::ViewerConfig;
pub use engine::{BackendKind, EngineConfig, EngineHandle};
pub use loader::{LoadError, LoadOptions, ModelLoader};
pub use model::{LoadedModel, ModelSource, ModelStats};
pub use scene::SceneContext;
pub use viewer::ViewerSession;
