//! Interactive water-ripple effect over a live video feed.
//!
//! A fixed-resolution height field is advanced by a damped wave equation on the
//! GPU; pointer input drops raised-cosine impulses into it, and every frame the
//! video is refracted through the field's gradient. The flow per tick:
//!
//! ```text
//!   winit events ──▶ PointerInbox ──┐
//!                                   ▼
//!   FrameSource ──▶ VideoTexture   Simulation::tick
//!                        │           │ drop pass (+ swap) per impulse
//!                        │           │ wave pass (+ swap)
//!                        └──────────▶│ composite pass ──▶ swapchain
//! ```
//!
//! [`kernels`] holds CPU versions of the three stage programs and defines their
//! exact numeric behaviour; [`driver`] owns ordering and buffer swapping
//! independent of any GPU; `gpu` realises the stages with `wgpu`; and
//! [`RippleRuntime`] runs the window and event loop.

#[cfg(feature = "camera")]
mod camera;
mod compile;
pub mod driver;
mod error;
mod gpu;
pub mod kernels;
pub mod pointer;
pub mod source;
mod types;
mod window;

pub use driver::{CpuBackend, PingPong, Phase, Simulation, StageBackend, TickReport, ViewportState};
pub use error::InitError;
pub use kernels::{CompositeParams, HeightField};
pub use pointer::{Impulse, ImpulseParams, PointerEvent, PointerInbox, PointerKind};
pub use source::{
    open_source, FrameSource, FrameSourceKind, ImageSource, SourceError, TestPatternSource,
    VideoFrame,
};
pub use types::{
    AdapterProfile, ColorSpaceMode, GpuPowerPreference, RendererConfig, SimulationParams,
    DEFAULT_DAMPING, DEFAULT_RESOLUTION, DEFAULT_RIPPLE_STRENGTH,
};
pub use window::RippleRuntime;
