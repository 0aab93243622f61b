//! Backend selection and the GPU device handle.
//!
//! The viewer first probes the primary native backends (Vulkan, Metal,
//! DX12), and when no adapter answers it falls back to GL with the same
//! surface settings. Which backend actually won, and whether it was the
//! fallback, is captured on the handle so the rest of the viewer can adapt
//! (the disposer flushes extra on the primary path, where unreferenced
//! resources otherwise linger until the next submit).

use std::sync::Arc;

use winit::window::Window;

use crate::config::ViewerConfig;

/// The two backend tiers the viewer distinguishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    /// Vulkan, Metal or DX12, whichever the platform offers.
    Primary,
    /// OpenGL/GLES compatibility tier.
    Gl,
}

impl BackendKind {
    fn backends(self) -> wgpu::Backends {
        match self {
            BackendKind::Primary => wgpu::Backends::PRIMARY,
            BackendKind::Gl => wgpu::Backends::GL,
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Primary => write!(f, "primary"),
            BackendKind::Gl => write!(f, "gl"),
        }
    }
}

/// Surface and context settings fixed at engine creation.
#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    pub prefer_primary: bool,
    pub antialias: bool,
    pub stencil: bool,
    pub alpha_channel: bool,
    pub preserve_buffer: bool,
}

impl EngineConfig {
    pub fn from_viewer(config: &ViewerConfig) -> Self {
        Self {
            prefer_primary: config.prefer_primary_backend,
            antialias: config.antialias,
            stencil: config.stencil,
            alpha_channel: config.alpha_channel,
            preserve_buffer: config.preserve_buffer,
        }
    }

    /// Backends to try, most preferred first.
    pub fn candidates(&self) -> [BackendKind; 2] {
        if self.prefer_primary {
            [BackendKind::Primary, BackendKind::Gl]
        } else {
            [BackendKind::Gl, BackendKind::Primary]
        }
    }

    pub fn sample_count(&self) -> u32 {
        if self.antialias { 4 } else { 1 }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_viewer(&ViewerConfig::default())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no usable backend (tried {tried})")]
    NoBackend { tried: String },
}

/// Drops known-noisy driver messages before they reach the log. Everything
/// else passes through at its original severity.
#[derive(Clone, Debug)]
pub struct DiagnosticFilter {
    denylist: &'static [&'static str],
}

impl DiagnosticFilter {
    pub fn suppresses(&self, message: &str) -> bool {
        self.denylist.iter().any(|needle| message.contains(needle))
    }

    pub fn report(&self, message: &str) {
        if self.suppresses(message) {
            return;
        }
        log::error!("gpu: {message}");
    }
}

impl Default for DiagnosticFilter {
    fn default() -> Self {
        Self {
            // GL drivers re-report these per frame; once at startup is enough.
            denylist: &[
                "GL_INVALID_FRAMEBUFFER_OPERATION",
                "Vertex shader is not compiled",
            ],
        }
    }
}

/// The selected backend plus everything created from it.
pub struct EngineHandle {
    pub instance: wgpu::Instance,
    pub surface: wgpu::Surface<'static>,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub kind: BackendKind,
    pub is_fallback: bool,
    pub diagnostics: DiagnosticFilter,
}

/// The full bring-up attempt for one backend. Any stage failing (surface,
/// adapter, device) fails the probe as a whole so the next candidate gets
/// its turn.
struct BackendProbe {
    instance: wgpu::Instance,
    surface: wgpu::Surface<'static>,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
}

async fn probe_backend(window: Arc<Window>, kind: BackendKind) -> Result<BackendProbe, String> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: kind.backends(),
        ..Default::default()
    });
    let surface = instance
        .create_surface(window)
        .map_err(|error| format!("surface: {error}"))?;
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        })
        .await
        .map_err(|error| format!("adapter: {error}"))?;
    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("viewer_device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: Default::default(),
            trace: wgpu::Trace::Off,
        })
        .await
        .map_err(|error| format!("device: {error}"))?;
    Ok(BackendProbe {
        instance,
        surface,
        adapter,
        device,
        queue,
    })
}

impl EngineHandle {
    /// Probe the candidate backends in preference order and keep the first
    /// one that brings up a full device. A probe stops at its first failed
    /// stage; only when every candidate fails is the error fatal.
    pub async fn create(window: Arc<Window>, config: EngineConfig) -> Result<Self, EngineError> {
        let candidates = config.candidates();
        let mut probes = Vec::new();
        for kind in candidates {
            let outcome = probe_backend(window.clone(), kind).await;
            let succeeded = outcome.is_ok();
            probes.push((kind, outcome));
            if succeeded {
                break;
            }
        }

        let (kind, probe, is_fallback) =
            select_from_probes(probes).map_err(|tried| EngineError::NoBackend { tried })?;
        if is_fallback {
            log::warn!("{} backend unavailable, falling back to {kind}", candidates[0]);
        }
        let info = probe.adapter.get_info();
        log::info!("using {kind} backend: {} ({:?})", info.name, info.backend);

        let diagnostics = DiagnosticFilter::default();
        let filter = diagnostics.clone();
        probe.device.on_uncaptured_error(Box::new(move |error| {
            filter.report(&format!("{error:?}"));
        }));

        Ok(Self {
            instance: probe.instance,
            surface: probe.surface,
            adapter: probe.adapter,
            device: probe.device,
            queue: probe.queue,
            kind,
            is_fallback,
            diagnostics,
        })
    }

    /// Flush handle for work running off the event loop; wgpu handles are
    /// refcounted, so the clones stay valid for as long as the task needs.
    pub fn flush_handle(&self) -> FlushHandle {
        FlushHandle {
            device: self.device.clone(),
            queue: self.queue.clone(),
            kind: self.kind,
        }
    }
}

/// Device/queue pair detached from the engine handle.
#[derive(Clone)]
pub struct FlushHandle {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pub kind: BackendKind,
}

impl FlushHandle {
    /// Submit an empty command list and poll the device so destroyed
    /// resources are reclaimed promptly. Only worth it on the primary
    /// backend; GL frees eagerly.
    pub fn flush(&self) {
        self.queue.submit(std::iter::empty());
        let _ = self.device.poll(wgpu::PollType::Poll);
    }
}

/// Outcome of ranking backend probes. Pure so the fallback policy is
/// testable without touching a GPU.
fn select_from_probes<T>(
    probes: Vec<(BackendKind, Result<T, String>)>,
) -> Result<(BackendKind, T, bool), String> {
    let mut failures = Vec::new();
    for (rank, (kind, outcome)) in probes.into_iter().enumerate() {
        match outcome {
            Ok(value) => return Ok((kind, value, rank > 0)),
            Err(error) => failures.push((kind, error)),
        }
    }
    Err(summarize_probes(&failures))
}

fn summarize_probes(failures: &[(BackendKind, String)]) -> String {
    failures
        .iter()
        .map(|(kind, error)| format!("{kind}: {error}"))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preferred_backend_wins_when_available() {
        let probes = vec![
            (BackendKind::Primary, Ok::<_, String>("vulkan")),
            (BackendKind::Gl, Ok("gles")),
        ];
        let (kind, value, is_fallback) = select_from_probes(probes).unwrap();
        assert_eq!(kind, BackendKind::Primary);
        assert_eq!(value, "vulkan");
        assert!(!is_fallback);
    }

    #[test]
    fn device_failure_on_the_preferred_backend_still_falls_back() {
        // the probe covers the whole bring-up, so a late device rejection
        // ranks the same as no adapter at all
        let probes = vec![
            (
                BackendKind::Primary,
                Err("device: requested limits not supported".to_string()),
            ),
            (BackendKind::Gl, Ok("gles")),
        ];
        let (kind, _, is_fallback) = select_from_probes(probes).unwrap();
        assert_eq!(kind, BackendKind::Gl);
        assert!(is_fallback);
    }

    #[test]
    fn a_successful_first_probe_needs_no_second_candidate() {
        let probes = vec![(BackendKind::Primary, Ok::<_, String>("vulkan"))];
        let (kind, _, is_fallback) = select_from_probes(probes).unwrap();
        assert_eq!(kind, BackendKind::Primary);
        assert!(!is_fallback);
    }

    #[test]
    fn fallback_is_flagged_when_preferred_probe_fails() {
        let probes = vec![
            (BackendKind::Primary, Err("no adapter".to_string())),
            (BackendKind::Gl, Ok("gles")),
        ];
        let (kind, _, is_fallback) = select_from_probes(probes).unwrap();
        assert_eq!(kind, BackendKind::Gl);
        assert!(is_fallback);
    }

    #[test]
    fn exhausted_probes_report_every_failure() {
        let probes: Vec<(BackendKind, Result<(), String>)> = vec![
            (BackendKind::Primary, Err("no adapter".to_string())),
            (BackendKind::Gl, Err("context lost".to_string())),
        ];
        let error = select_from_probes(probes).unwrap_err();
        assert!(error.contains("primary"));
        assert!(error.contains("gl"));
        assert!(error.contains("context lost"));
    }

    #[test]
    fn candidate_order_follows_preference() {
        let mut config = EngineConfig::default();
        config.prefer_primary = true;
        assert_eq!(config.candidates()[0], BackendKind::Primary);
        config.prefer_primary = false;
        assert_eq!(config.candidates()[0], BackendKind::Gl);
    }

    #[test]
    fn diagnostic_filter_suppresses_denylisted_messages_only() {
        let filter = DiagnosticFilter::default();
        assert!(filter.suppresses("error: GL_INVALID_FRAMEBUFFER_OPERATION in glDraw"));
        assert!(!filter.suppresses("validation error: buffer out of range"));
    }
}
