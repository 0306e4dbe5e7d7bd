//! Demo: a window whose clear color cycles through a palette on a timer.
//!
//! Exercises the engine surface end to end: an application-tier
//! repopulating descriptor driven by a staleness signal, a scheduled action
//! that raises the signal and re-arms itself, a device-tier buffer built
//! from the GPU context, and a root content that renders and reacts to keys.

use std::rc::Rc;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Result;

use vitrail_engine::core::{DeviceInitInfo, RenderInfo, WindowRootContent};
use vitrail_engine::input::{Key, KeyEvent};
use vitrail_engine::logging::{LoggingConfig, init_logging};
use vitrail_engine::resources::{
    ApplicationResource, DeviceResource, Resource, ResourceDescriptor, ResourceKey,
    StalenessSignal,
};
use vitrail_engine::time::GameLoopScheduler;
use vitrail_engine::window::{EngineConfig, Runtime, WindowConfig};

/// Current backdrop color, application tier.
struct Backdrop {
    r: f64,
    g: f64,
    b: f64,
}

impl Resource for Backdrop {}
impl ApplicationResource for Backdrop {}

/// Scratch uniform buffer, device tier. Exists to show a resource whose
/// lifetime is pinned to the GPU device.
struct ScratchUniform {
    #[allow(dead_code)]
    buffer: wgpu::Buffer,
}

impl Resource for ScratchUniform {}
impl DeviceResource for ScratchUniform {}

static BACKDROP: LazyLock<ResourceKey<Backdrop>> =
    LazyLock::new(|| ResourceKey::new("demo.backdrop"));
static SCRATCH: LazyLock<ResourceKey<ScratchUniform>> =
    LazyLock::new(|| ResourceKey::new("demo.scratch-uniform"));

const PALETTE: [(f64, f64, f64); 4] = [
    (0.06, 0.08, 0.12),
    (0.12, 0.05, 0.10),
    (0.04, 0.11, 0.09),
    (0.10, 0.09, 0.03),
];

/// Re-arming palette step: raises the staleness signal, then schedules the
/// next step.
fn schedule_palette_step(
    scheduler: &Rc<GameLoopScheduler>,
    signal: StalenessSignal<usize>,
    step: usize,
) {
    let rearm = scheduler.clone();
    scheduler.schedule(Duration::from_secs(2), move || {
        signal.raise(step);
        schedule_palette_step(&rearm, signal.clone(), step + 1);
    });
}

struct DemoContent {
    exit_requested: bool,
}

impl WindowRootContent for DemoContent {
    fn on_key_down(&mut self, event: &mut KeyEvent) {
        if event.hardware_key == Key::Escape {
            self.exit_requested = true;
            event.stop_processing();
        }
    }

    fn on_device_init(&mut self, info: DeviceInitInfo<'_>) {
        let scratch = info.device_resources.get(*SCRATCH);
        log::info!(
            "device ready, scratch uniform present: {}",
            scratch.is_ok()
        );
    }

    fn on_render(&mut self, info: &mut RenderInfo<'_>) {
        if self.exit_requested {
            info.runtime.exit();
            return;
        }

        let (r, g, b) = match info.application_resources.get(*BACKDROP) {
            Ok(backdrop) => (backdrop.r, backdrop.g, backdrop.b),
            Err(err) => {
                log::warn!("backdrop missing, clearing to black: {err}");
                (0.0, 0.0, 0.0)
            }
        };

        {
            let frame = &mut *info.frame;
            let _pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("demo clear pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a: 1.0 }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
        }

        // keep animating
        info.request_render();
    }
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let scheduler = Rc::new(GameLoopScheduler::new());
    let palette_signal = StalenessSignal::<usize>::new();
    schedule_palette_step(&scheduler, palette_signal.clone(), 1);

    let backdrop_descriptor = ResourceDescriptor::repopulating_application(
        *BACKDROP,
        palette_signal,
        |_provider: &vitrail_engine::resources::ApplicationProvider<'_>,
         step: Option<usize>,
         _previous: Option<&Backdrop>| {
            let (r, g, b) = PALETTE[step.unwrap_or(0) % PALETTE.len()];
            Ok(Some(Backdrop { r, g, b }))
        },
    );

    let scratch_descriptor = ResourceDescriptor::device_once(*SCRATCH, |provider| {
        let context = provider
            .context()
            .ok_or_else(|| anyhow::anyhow!("device context not published"))?;
        let buffer = context.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("demo scratch uniform"),
            size: 256,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Ok(ScratchUniform { buffer })
    });

    let mut window = WindowConfig::new(
        "vitrail demo",
        Box::new(DemoContent {
            exit_requested: false,
        }),
    );
    window.initial_size = winit::dpi::LogicalSize::new(960.0, 600.0);
    window.device_descriptors.push(scratch_descriptor);

    let mut config = EngineConfig::new(window);
    config.scheduler = scheduler;
    config.application_descriptors.push(backdrop_descriptor);

    Runtime::run(config)
}
