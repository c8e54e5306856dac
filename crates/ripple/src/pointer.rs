//! Pointer capture and per-tick coalescing.
//!
//! Input providers post events from any thread; the tick loop drains them once
//! per frame. Moves collapse into a single pending slot, presses are kept in
//! full.

use std::sync::{Arc, Mutex, PoisonError};

/// Lower bound applied to incoming coordinates.
const COORD_MIN: f32 = -0.5;
/// Upper bound applied to incoming coordinates.
const COORD_MAX: f32 = 1.5;

/// Radius and peak height of one impulse, both in output-space units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpulseParams {
    pub radius: f32,
    pub strength: f32,
}

impl ImpulseParams {
    /// Weak, small drop for continuous pointer motion.
    pub const HOVER: Self = Self {
        radius: 0.04,
        strength: 0.1,
    };
    /// Strong drop for a discrete press.
    pub const PRESS: Self = Self {
        radius: 0.05,
        strength: 1.0,
    };
}

/// A drop to inject into the height field, centred at `(x, y)` in output space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Impulse {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub strength: f32,
}

impl Impulse {
    pub fn new(x: f32, y: f32, params: ImpulseParams) -> Self {
        Self {
            x,
            y,
            radius: params.radius,
            strength: params.strength,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Move,
    Down,
}

/// Pointer sample in output space (origin bottom-left, unit square).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub x: f32,
    pub y: f32,
    pub kind: PointerKind,
}

impl PointerEvent {
    pub fn new(kind: PointerKind, x: f32, y: f32) -> Self {
        Self { x, y, kind }
    }

    /// Converts a window position in physical pixels (origin top-left) to
    /// output space. Returns `None` for a zero-sized surface.
    pub fn from_surface(
        kind: PointerKind,
        position: (f64, f64),
        surface: (u32, u32),
    ) -> Option<Self> {
        let (width, height) = surface;
        if width == 0 || height == 0 {
            return None;
        }
        let x = (position.0 / f64::from(width)) as f32;
        let y = 1.0 - (position.1 / f64::from(height)) as f32;
        Some(Self::new(kind, x, y))
    }
}

#[derive(Debug, Default)]
struct PendingPointer {
    sequence: u64,
    latest_move: Option<(u64, f32, f32)>,
    downs: Vec<(u64, f32, f32)>,
}

/// Thread-safe mailbox between pointer providers and the tick loop.
#[derive(Debug, Clone, Default)]
pub struct PointerInbox {
    inner: Arc<Mutex<PendingPointer>>,
}

impl PointerInbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an event. Never blocks on the tick loop beyond the short
    /// critical section.
    pub fn post(&self, event: PointerEvent) {
        let x = sanitize(event.x);
        let y = sanitize(event.y);
        let mut pending = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        pending.sequence += 1;
        let sequence = pending.sequence;
        match event.kind {
            PointerKind::Move => pending.latest_move = Some((sequence, x, y)),
            PointerKind::Down => pending.downs.push((sequence, x, y)),
        }
    }

    /// Takes everything posted since the previous drain, as impulses in
    /// arrival order.
    pub fn drain(&self, hover: ImpulseParams, press: ImpulseParams) -> Vec<Impulse> {
        let (latest_move, downs) = {
            let mut pending = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            (pending.latest_move.take(), std::mem::take(&mut pending.downs))
        };

        let mut ordered: Vec<(u64, Impulse)> = downs
            .into_iter()
            .map(|(sequence, x, y)| (sequence, Impulse::new(x, y, press)))
            .collect();
        if let Some((sequence, x, y)) = latest_move {
            ordered.push((sequence, Impulse::new(x, y, hover)));
        }
        ordered.sort_by_key(|(sequence, _)| *sequence);
        ordered.into_iter().map(|(_, impulse)| impulse).collect()
    }

    pub fn is_empty(&self) -> bool {
        let pending = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        pending.latest_move.is_none() && pending.downs.is_empty()
    }
}

fn sanitize(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(COORD_MIN, COORD_MAX)
    } else {
        COORD_MAX
    }
}
