//! Tick orchestration shared by the GPU and CPU realisations.
//!
//! [`Simulation`] owns the two height-field buffers and decides the order in
//! which stages run; a [`StageBackend`] supplies the actual passes.

use tracing::{debug, trace};

use crate::kernels::{self, CompositeParams, HeightField};
use crate::pointer::{Impulse, PointerInbox};
use crate::source::VideoFrame;
use crate::types::SimulationParams;

/// Two physically distinct buffers, one readable and one writable per pass.
#[derive(Debug)]
pub struct PingPong<F> {
    targets: [F; 2],
    current: usize,
}

impl<F> PingPong<F> {
    pub fn new(first: F, second: F) -> Self {
        Self {
            targets: [first, second],
            current: 0,
        }
    }

    pub fn current(&self) -> &F {
        &self.targets[self.current]
    }

    /// `(read, write)` for the next pass.
    pub fn split(&mut self) -> (&F, &mut F) {
        let [first, second] = &mut self.targets;
        if self.current == 0 {
            (first, second)
        } else {
            (second, first)
        }
    }

    pub fn swap(&mut self) {
        self.current ^= 1;
    }

    pub fn current_index(&self) -> usize {
        self.current
    }
}

/// Lifecycle of a constructed simulation. Failed construction never yields a
/// value, so there is no variant for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Ready,
    Running,
    Disposed,
}

/// Output surface and video dimensions, read only by compositing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportState {
    pub width: u32,
    pub height: u32,
    pub video_width: u32,
    pub video_height: u32,
}

impl ViewportState {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            video_width: 0,
            video_height: 0,
        }
    }

    pub fn canvas_aspect(&self) -> f32 {
        aspect(self.width, self.height).unwrap_or(1.0)
    }

    /// Falls back to the canvas aspect until a frame size is known, which
    /// leaves the video unscaled.
    pub fn video_aspect(&self) -> f32 {
        aspect(self.video_width, self.video_height).unwrap_or_else(|| self.canvas_aspect())
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    /// Returns `true` when the stored size changed.
    pub fn set_video_size(&mut self, width: u32, height: u32) -> bool {
        let changed = self.video_width != width || self.video_height != height;
        self.video_width = width;
        self.video_height = height;
        changed
    }
}

fn aspect(width: u32, height: u32) -> Option<f32> {
    (width > 0 && height > 0).then(|| width as f32 / height as f32)
}

/// The three stage programs. Every call receives the buffers explicitly and
/// must not retain them.
pub trait StageBackend {
    type Field;
    type Output: ?Sized;

    fn inject(
        &mut self,
        source: &Self::Field,
        target: &mut Self::Field,
        impulse: &Impulse,
        aspect: f32,
    );

    fn propagate(&mut self, source: &Self::Field, target: &mut Self::Field, damping: f32);

    fn composite(&mut self, field: &Self::Field, output: &mut Self::Output, params: &CompositeParams);
}

/// What one call to [`Simulation::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    pub impulses: usize,
    pub swaps: usize,
    pub composited: bool,
    pub skipped: bool,
}

impl TickReport {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// One ripple simulation: buffers, pending input, viewport and lifecycle.
#[derive(Debug)]
pub struct Simulation<F> {
    fields: PingPong<F>,
    params: SimulationParams,
    viewport: ViewportState,
    pointer: PointerInbox,
    phase: Phase,
    ticks: u64,
}

impl<F> Simulation<F> {
    /// Allocates both buffers through `allocate`; any error aborts
    /// construction.
    pub fn initialise<E>(
        params: SimulationParams,
        viewport: ViewportState,
        mut allocate: impl FnMut(u32) -> Result<F, E>,
    ) -> Result<Self, E> {
        let first = allocate(params.resolution)?;
        let second = allocate(params.resolution)?;
        Ok(Self::from_fields(params, viewport, PingPong::new(first, second)))
    }

    pub fn from_fields(
        params: SimulationParams,
        viewport: ViewportState,
        fields: PingPong<F>,
    ) -> Self {
        Self {
            fields,
            params,
            viewport,
            pointer: PointerInbox::new(),
            phase: Phase::Ready,
            ticks: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    pub fn viewport(&self) -> ViewportState {
        self.viewport
    }

    pub fn field(&self) -> &F {
        self.fields.current()
    }

    /// Handle for posting pointer events, cloneable across threads.
    pub fn pointer(&self) -> PointerInbox {
        self.pointer.clone()
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewport.resize(width, height);
    }

    pub fn set_video_size(&mut self, width: u32, height: u32) -> bool {
        self.viewport.set_video_size(width, height)
    }

    pub fn composite_params(&self) -> CompositeParams {
        CompositeParams {
            canvas_aspect: self.viewport.canvas_aspect(),
            video_aspect: self.viewport.video_aspect(),
            ripple_strength: self.params.ripple_strength,
            mirror: self.params.mirror,
        }
    }

    /// Stops all further ticks. Resources may be released once this returns.
    pub fn dispose(&mut self) {
        if self.phase != Phase::Disposed {
            debug!(ticks = self.ticks, "simulation disposed");
        }
        self.phase = Phase::Disposed;
    }

    /// Runs one frame: pending impulses, one wave step, one composite.
    pub fn tick<B>(&mut self, backend: &mut B, output: &mut B::Output) -> TickReport
    where
        B: StageBackend<Field = F>,
    {
        if self.phase == Phase::Disposed {
            return TickReport::skipped();
        }
        self.phase = Phase::Running;

        let mut report = TickReport::default();
        let aspect = self.viewport.canvas_aspect();
        for impulse in self.pointer.drain(self.params.hover, self.params.press) {
            let (source, target) = self.fields.split();
            backend.inject(source, target, &impulse, aspect);
            self.fields.swap();
            report.impulses += 1;
            report.swaps += 1;
        }

        let (source, target) = self.fields.split();
        backend.propagate(source, target, self.params.damping);
        self.fields.swap();
        report.swaps += 1;

        let params = self.composite_params();
        backend.composite(self.fields.current(), output, &params);
        report.composited = true;

        self.ticks += 1;
        trace!(tick = self.ticks, impulses = report.impulses, "tick");
        report
    }
}

/// CPU realisation over [`kernels`], compositing into an RGBA image.
pub struct CpuBackend<'v> {
    video: VideoFrame<'v>,
}

impl<'v> CpuBackend<'v> {
    pub fn new(video: VideoFrame<'v>) -> Self {
        Self { video }
    }

    pub fn set_video(&mut self, video: VideoFrame<'v>) {
        self.video = video;
    }

    fn sample(&self, coord: [f32; 2]) -> image::Rgba<u8> {
        let width = self.video.width.max(1);
        let height = self.video.height.max(1);
        let x = ((coord[0] * width as f32) as u32).min(width - 1);
        let y = ((coord[1] * height as f32) as u32).min(height - 1);
        let offset = ((y * width + x) * 4) as usize;
        match self.video.pixels.get(offset..offset + 4) {
            Some(px) => image::Rgba([px[0], px[1], px[2], px[3]]),
            None => image::Rgba([0, 0, 0, 255]),
        }
    }
}

impl StageBackend for CpuBackend<'_> {
    type Field = HeightField;
    type Output = image::RgbaImage;

    fn inject(&mut self, source: &HeightField, target: &mut HeightField, impulse: &Impulse, aspect: f32) {
        kernels::inject(source, target, impulse, aspect);
    }

    fn propagate(&mut self, source: &HeightField, target: &mut HeightField, damping: f32) {
        kernels::propagate(source, target, damping);
    }

    fn composite(&mut self, field: &HeightField, output: &mut image::RgbaImage, params: &CompositeParams) {
        let (width, height) = output.dimensions();
        for py in 0..height {
            for px in 0..width {
                let uv = [
                    (px as f32 + 0.5) / width as f32,
                    1.0 - (py as f32 + 0.5) / height as f32,
                ];
                let coord = kernels::composite_coord(field, uv, params);
                output.put_pixel(px, py, self.sample(coord));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pointer::{PointerEvent, PointerKind};

    #[derive(Debug)]
    struct Tagged(usize);

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Inject { from: usize, to: usize, impulse: Impulse },
        Propagate { from: usize, to: usize },
        Composite { field: usize, params: CompositeParams },
    }

    #[derive(Default)]
    struct Recorder {
        calls: Vec<Call>,
    }

    impl StageBackend for Recorder {
        type Field = Tagged;
        type Output = ();

        fn inject(&mut self, source: &Tagged, target: &mut Tagged, impulse: &Impulse, _aspect: f32) {
            self.calls.push(Call::Inject {
                from: source.0,
                to: target.0,
                impulse: *impulse,
            });
        }

        fn propagate(&mut self, source: &Tagged, target: &mut Tagged, _damping: f32) {
            self.calls.push(Call::Propagate {
                from: source.0,
                to: target.0,
            });
        }

        fn composite(&mut self, field: &Tagged, _output: &mut (), params: &CompositeParams) {
            self.calls.push(Call::Composite {
                field: field.0,
                params: *params,
            });
        }
    }

    fn tagged_simulation() -> Simulation<Tagged> {
        let mut next = 0;
        Simulation::initialise::<()>(
            SimulationParams::default(),
            ViewportState::new(800, 600),
            |_| {
                next += 1;
                Ok(Tagged(next - 1))
            },
        )
        .expect("allocation cannot fail")
    }

    #[test]
    fn ping_pong_halves_never_alias() {
        let mut pair = PingPong::new(Tagged(0), Tagged(1));
        for _ in 0..5 {
            let (read, write) = pair.split();
            assert_ne!(read.0, write.0);
            pair.swap();
        }
        assert_eq!(pair.current().0, 1);
    }

    #[test]
    fn tick_runs_stages_in_order_with_a_swap_after_each_write() {
        let mut simulation = tagged_simulation();
        let pointer = simulation.pointer();
        pointer.post(PointerEvent::new(PointerKind::Down, 0.2, 0.2));
        pointer.post(PointerEvent::new(PointerKind::Move, 0.6, 0.6));

        let mut backend = Recorder::default();
        let report = simulation.tick(&mut backend, &mut ());
        assert_eq!(report.impulses, 2);
        assert_eq!(report.swaps, 3);
        assert!(report.composited);

        let params = simulation.composite_params();
        assert_eq!(
            backend.calls,
            vec![
                Call::Inject {
                    from: 0,
                    to: 1,
                    impulse: Impulse::new(0.2, 0.2, simulation.params().press),
                },
                Call::Inject {
                    from: 1,
                    to: 0,
                    impulse: Impulse::new(0.6, 0.6, simulation.params().hover),
                },
                Call::Propagate { from: 0, to: 1 },
                Call::Composite { field: 1, params },
            ]
        );
        assert_eq!(simulation.phase(), Phase::Running);
    }

    #[test]
    fn idle_tick_propagates_and_composites_once() {
        let mut simulation = tagged_simulation();
        assert_eq!(simulation.phase(), Phase::Ready);
        let mut backend = Recorder::default();
        simulation.tick(&mut backend, &mut ());
        simulation.tick(&mut backend, &mut ());
        assert_eq!(
            backend.calls.iter().filter(|c| matches!(c, Call::Propagate { .. })).count(),
            2
        );
        assert_eq!(simulation.ticks(), 2);
    }

    #[test]
    fn coalesced_moves_inject_one_weak_impulse() {
        let mut simulation = tagged_simulation();
        let pointer = simulation.pointer();
        for step in [0.1, 0.2, 0.3] {
            pointer.post(PointerEvent::new(PointerKind::Move, step, step));
        }
        let mut backend = Recorder::default();
        simulation.tick(&mut backend, &mut ());
        let injected: Vec<_> = backend
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Inject { impulse, .. } => Some(*impulse),
                _ => None,
            })
            .collect();
        assert_eq!(injected, vec![Impulse::new(0.3, 0.3, simulation.params().hover)]);
    }

    #[test]
    fn disposed_simulation_ignores_queued_ticks() {
        let mut simulation = tagged_simulation();
        let mut backend = Recorder::default();
        simulation.tick(&mut backend, &mut ());
        simulation
            .pointer()
            .post(PointerEvent::new(PointerKind::Down, 0.5, 0.5));
        simulation.dispose();
        backend.calls.clear();

        let report = simulation.tick(&mut backend, &mut ());
        assert!(report.skipped);
        assert!(backend.calls.is_empty());
        assert_eq!(simulation.phase(), Phase::Disposed);
        assert_eq!(simulation.ticks(), 1);
    }

    #[test]
    fn failed_allocation_yields_no_simulation() {
        let mut calls = 0;
        let result = Simulation::<Tagged>::initialise(
            SimulationParams::default(),
            ViewportState::new(640, 480),
            |_| {
                calls += 1;
                if calls == 2 {
                    Err("out of memory")
                } else {
                    Ok(Tagged(calls))
                }
            },
        );
        assert_eq!(result.err(), Some("out of memory"));
    }

    #[test]
    fn viewport_aspects_follow_resize_and_video_metadata() {
        let mut viewport = ViewportState::new(800, 600);
        assert!((viewport.video_aspect() - viewport.canvas_aspect()).abs() < 1e-6);
        assert!(viewport.set_video_size(640, 480));
        assert!(!viewport.set_video_size(640, 480));
        viewport.resize(1920, 1080);
        assert!((viewport.canvas_aspect() - 16.0 / 9.0).abs() < 1e-6);
        assert!((viewport.video_aspect() - 4.0 / 3.0).abs() < 1e-6);
        viewport.resize(0, 0);
        assert_eq!(viewport.canvas_aspect(), 1.0);
    }

    fn cpu_simulation(resolution: u32, width: u32, height: u32) -> Simulation<HeightField> {
        let params = SimulationParams {
            resolution,
            ..SimulationParams::default()
        };
        Simulation::initialise::<()>(params, ViewportState::new(width, height), |n| {
            Ok(HeightField::new(n))
        })
        .expect("cpu allocation")
    }

    #[test]
    fn resize_changes_only_compositing_constants() {
        let pixels = vec![128u8; 640 * 480 * 4];
        let frame = VideoFrame::new(640, 480, &pixels);
        let mut backend = CpuBackend::new(frame);
        let mut output = image::RgbaImage::new(16, 12);

        let mut resized = cpu_simulation(128, 800, 600);
        let mut reference = cpu_simulation(128, 800, 600);
        for simulation in [&mut resized, &mut reference] {
            simulation.set_video_size(640, 480);
            simulation
                .pointer()
                .post(PointerEvent::new(PointerKind::Down, 0.5, 0.5));
            simulation.tick(&mut backend, &mut output);
        }

        let before = resized.composite_params();
        resized.resize(1920, 1080);
        let after = resized.composite_params();
        assert_ne!(before.canvas_aspect, after.canvas_aspect);
        assert_eq!(before.video_aspect, after.video_aspect);
        assert_eq!(resized.field(), reference.field());
        assert_eq!(resized.field().resolution(), 128);

        for _ in 0..3 {
            resized.tick(&mut backend, &mut output);
            reference.tick(&mut backend, &mut output);
        }
        assert_eq!(resized.field(), reference.field());
    }

    #[test]
    fn cpu_composite_passes_video_through_flat_water() {
        let mut pixels = Vec::with_capacity(4 * 4 * 4);
        for y in 0..4u8 {
            for x in 0..4u8 {
                pixels.extend_from_slice(&[x * 60, y * 60, 0, 255]);
            }
        }
        let mut backend = CpuBackend::new(VideoFrame::new(4, 4, &pixels));
        let mut simulation = Simulation::from_fields(
            SimulationParams {
                resolution: 64,
                mirror: false,
                ..SimulationParams::default()
            },
            ViewportState {
                width: 4,
                height: 4,
                video_width: 4,
                video_height: 4,
            },
            PingPong::new(HeightField::new(64), HeightField::new(64)),
        );
        let mut output = image::RgbaImage::new(4, 4);
        simulation.tick(&mut backend, &mut output);
        for (x, y, pixel) in output.enumerate_pixels() {
            assert_eq!(pixel.0, [x as u8 * 60, y as u8 * 60, 0, 255]);
        }
    }
}
