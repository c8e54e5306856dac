//! `wgpu` realisation of the ripple stages.
//!
//! - `context` owns instance/device/surface wiring and picks the swapchain
//!   format for the requested colour handling.
//! - `field` allocates the two `Rgba16Float` height-field render targets.
//! - `pipeline` compiles the GLSL kernels into drop, wave and composite
//!   pipelines sharing one set of bind group layouts.
//! - `uniforms` mirrors each kernel's parameter block and stages per-pass
//!   copies on the command encoder.
//! - `video` keeps the latest source frame resident as a texture.
//! - `state` glues everything to [`Simulation`](crate::driver::Simulation) and
//!   exposes the `GpuState` API used by `window`.

mod context;
mod field;
mod pipeline;
mod state;
mod uniforms;
mod video;

pub(crate) use state::GpuState;
