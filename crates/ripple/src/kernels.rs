//! Reference implementations of the three stage programs.
//!
//! The GLSL in `compile.rs` is a line-for-line port of these functions; the
//! CPU versions are what the test-suite exercises and what [`CpuBackend`]
//! runs when no GPU is involved.
//!
//! Two coordinate spaces are used:
//!
//! ```text
//!   output space   (0,1) ┌─────┐ (1,1)     texture space  (0,0) ┌─────┐ (1,0)
//!                        │     │                                │     │
//!                  (0,0) └─────┘ (1,0)                    (0,1) └─────┘ (1,1)
//! ```
//!
//! Pointer positions, impulse centres and the compositing sample coordinate
//! live in output space. Height-field texels and video pixels are addressed in
//! texture space; texel `(i, j)` sits at output point
//! `((i + 0.5) / N, 1 - (j + 0.5) / N)`.
//!
//! [`CpuBackend`]: crate::driver::CpuBackend

use std::f32::consts::PI;

use crate::pointer::Impulse;

/// Square grid of `(height, previous height)` pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct HeightField {
    resolution: u32,
    cells: Vec<[f32; 2]>,
}

impl HeightField {
    /// Allocates a flat (all-zero) field.
    pub fn new(resolution: u32) -> Self {
        let resolution = resolution.max(1);
        Self {
            resolution,
            cells: vec![[0.0; 2]; (resolution as usize) * (resolution as usize)],
        }
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn cells(&self) -> &[[f32; 2]] {
        &self.cells
    }

    fn index(&self, column: u32, row: u32) -> usize {
        row as usize * self.resolution as usize + column as usize
    }

    pub fn height(&self, column: u32, row: u32) -> f32 {
        self.cells[self.index(column, row)][0]
    }

    pub fn previous(&self, column: u32, row: u32) -> f32 {
        self.cells[self.index(column, row)][1]
    }

    pub fn set(&mut self, column: u32, row: u32, height: f32, previous: f32) {
        let index = self.index(column, row);
        self.cells[index] = [height, previous];
    }

    /// Edge-clamped texel read; out-of-range indices repeat the border texel.
    pub fn sample_clamped(&self, column: i64, row: i64) -> [f32; 2] {
        let max = i64::from(self.resolution) - 1;
        let column = column.clamp(0, max) as u32;
        let row = row.clamp(0, max) as u32;
        self.cells[self.index(column, row)]
    }

    /// Output-space position of a texel centre.
    pub fn texel_center(&self, column: u32, row: u32) -> [f32; 2] {
        let n = self.resolution as f32;
        [(column as f32 + 0.5) / n, 1.0 - (row as f32 + 0.5) / n]
    }

    /// Bilinear height lookup at an output-space coordinate, clamped at the
    /// edges like a `ClampToEdge` linear sampler.
    pub fn sample_height(&self, point: [f32; 2]) -> f32 {
        let n = self.resolution as f32;
        let tx = point[0] * n - 0.5;
        let ty = (1.0 - point[1]) * n - 0.5;
        let x0 = tx.floor();
        let y0 = ty.floor();
        let fx = tx - x0;
        let fy = ty - y0;
        let (x0, y0) = (x0 as i64, y0 as i64);
        let h = |x: i64, y: i64| self.sample_clamped(x, y)[0];
        let top = h(x0, y0) * (1.0 - fx) + h(x0 + 1, y0) * fx;
        let bottom = h(x0, y0 + 1) * (1.0 - fx) + h(x0 + 1, y0 + 1) * fx;
        top * (1.0 - fy) + bottom * fy
    }

    pub fn total_abs_height(&self) -> f32 {
        self.cells.iter().map(|cell| cell[0].abs()).sum()
    }

    pub fn max_abs_height(&self) -> f32 {
        self.cells
            .iter()
            .map(|cell| cell[0].abs())
            .fold(0.0, f32::max)
    }

    /// Sum of squares over both channels.
    pub fn energy(&self) -> f64 {
        self.cells
            .iter()
            .map(|cell| f64::from(cell[0]).powi(2) + f64::from(cell[1]).powi(2))
            .sum()
    }
}

/// One discrete wave step: `h' = damping * (0.5 * (N + S + E + W) - prev)`,
/// `prev' = h`.
pub fn propagate(source: &HeightField, target: &mut HeightField, damping: f32) {
    debug_assert_eq!(source.resolution, target.resolution);
    let n = i64::from(source.resolution);
    for row in 0..n {
        for column in 0..n {
            let [height, previous] = source.sample_clamped(column, row);
            let north = source.sample_clamped(column, row - 1)[0];
            let south = source.sample_clamped(column, row + 1)[0];
            let east = source.sample_clamped(column + 1, row)[0];
            let west = source.sample_clamped(column - 1, row)[0];
            let next = damping * ((north + south + east + west) * 0.5 - previous);
            target.set(column as u32, row as u32, next, height);
        }
    }
}

/// Raised-cosine bump profile: 1 at the centre, 0 at and beyond `radius`.
pub fn bump(distance: f32, radius: f32) -> f32 {
    if radius <= 0.0 || distance >= radius {
        return 0.0;
    }
    let falloff = 1.0 - distance / radius;
    0.5 - (PI * falloff).cos() * 0.5
}

/// Distance between two output-space points with x stretched by `aspect`
/// (viewport width / height) so drops stay circular on screen.
pub fn aspect_distance(a: [f32; 2], b: [f32; 2], aspect: f32) -> f32 {
    let dx = (a[0] - b[0]) * aspect;
    let dy = a[1] - b[1];
    (dx * dx + dy * dy).sqrt()
}

/// Adds a radial bump to the height channel; the previous-height channel is
/// copied through untouched.
pub fn inject(source: &HeightField, target: &mut HeightField, impulse: &Impulse, aspect: f32) {
    debug_assert_eq!(source.resolution, target.resolution);
    let center = [impulse.x, impulse.y];
    for row in 0..source.resolution {
        for column in 0..source.resolution {
            let [height, previous] = source.sample_clamped(i64::from(column), i64::from(row));
            let distance = aspect_distance(source.texel_center(column, row), center, aspect);
            let added = bump(distance, impulse.radius) * impulse.strength;
            target.set(column, row, height + added, previous);
        }
    }
}

/// Per-axis scale that maps the output unit square onto the video.
///
/// Exactly one axis carries the aspect ratio; the other stays at 1.
pub fn cover_scale(canvas_aspect: f32, video_aspect: f32) -> [f32; 2] {
    if canvas_aspect > video_aspect {
        [canvas_aspect / video_aspect, 1.0]
    } else {
        [1.0, video_aspect / canvas_aspect]
    }
}

/// Output-space coordinate to video texture coordinate: centred scale, then
/// the vertical flip into texture space and the optional horizontal mirror.
pub fn video_coord(uv: [f32; 2], scale: [f32; 2], mirror: bool) -> [f32; 2] {
    let x = (uv[0] - 0.5) * scale[0] + 0.5;
    let y = (uv[1] - 0.5) * scale[1] + 0.5;
    let x = if mirror { 1.0 - x } else { x };
    [x, 1.0 - y]
}

/// Height-field gradient at an output-space coordinate, y negated into
/// texture orientation.
pub fn displacement(field: &HeightField, uv: [f32; 2]) -> [f32; 2] {
    let texel = 1.0 / field.resolution() as f32;
    let right = field.sample_height([uv[0] + texel, uv[1]]);
    let left = field.sample_height([uv[0] - texel, uv[1]]);
    let up = field.sample_height([uv[0], uv[1] + texel]);
    let down = field.sample_height([uv[0], uv[1] - texel]);
    [right - left, -(up - down)]
}

pub fn is_inside_unit(point: [f32; 2]) -> bool {
    (0.0..=1.0).contains(&point[0]) && (0.0..=1.0).contains(&point[1])
}

fn clamp_unit(point: [f32; 2]) -> [f32; 2] {
    [point[0].clamp(0.0, 1.0), point[1].clamp(0.0, 1.0)]
}

/// Constants the compositing stage reads once per pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositeParams {
    pub canvas_aspect: f32,
    pub video_aspect: f32,
    pub ripple_strength: f32,
    pub mirror: bool,
}

/// Final video sampling coordinate (texture space) for one output pixel.
///
/// Cropped-out margins sample the clamped video edge without displacement.
pub fn composite_coord(field: &HeightField, uv: [f32; 2], params: &CompositeParams) -> [f32; 2] {
    let scale = cover_scale(params.canvas_aspect, params.video_aspect);
    let video = video_coord(uv, scale, params.mirror);
    if !is_inside_unit(video) {
        return clamp_unit(video);
    }
    let offset = displacement(field, uv);
    clamp_unit([
        video[0] + offset[0] * params.ripple_strength,
        video[1] + offset[1] * params.ripple_strength,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press_at(x: f32, y: f32) -> Impulse {
        Impulse {
            x,
            y,
            radius: 0.05,
            strength: 1.0,
        }
    }

    fn nearest_texel(field: &HeightField, point: [f32; 2]) -> (u32, u32) {
        let n = field.resolution() as f32;
        let column = (point[0] * n).floor().clamp(0.0, n - 1.0) as u32;
        let row = ((1.0 - point[1]) * n).floor().clamp(0.0, n - 1.0) as u32;
        (column, row)
    }

    fn pressed_field(resolution: u32) -> HeightField {
        let flat = HeightField::new(resolution);
        let mut field = HeightField::new(resolution);
        inject(&flat, &mut field, &press_at(0.5, 0.5), 1.0);
        field
    }

    #[test]
    fn bump_is_one_at_centre_and_zero_at_rim() {
        assert!((bump(0.0, 0.05) - 1.0).abs() < 1e-6);
        assert!(bump(0.05, 0.05).abs() < 1e-6);
        assert_eq!(bump(0.07, 0.05), 0.0);
        let mut last = bump(0.0, 0.05);
        for step in 1..50 {
            let value = bump(step as f32 * 0.001, 0.05);
            assert!(value < last, "profile must fall off monotonically");
            last = value;
        }
    }

    #[test]
    fn press_scenario_matches_expected_heights() {
        let field = pressed_field(512);

        let (c, r) = nearest_texel(&field, [0.5, 0.5]);
        assert!((field.height(c, r) - 1.0).abs() < 0.01);

        let (c, r) = nearest_texel(&field, [0.55, 0.5]);
        let rim = field.texel_center(c, r);
        assert!((aspect_distance(rim, [0.5, 0.5], 1.0) - 0.05).abs() < 0.002);
        assert!(field.height(c, r).abs() < 1e-3);

        let (c, r) = nearest_texel(&field, [0.6, 0.5]);
        assert_eq!(field.height(c, r), 0.0);
    }

    #[test]
    fn injection_leaves_previous_channel_untouched() {
        let mut source = HeightField::new(64);
        for row in 0..64 {
            for column in 0..64 {
                source.set(column, row, 0.0, (column + row) as f32 * 0.01);
            }
        }
        let mut target = HeightField::new(64);
        inject(&source, &mut target, &press_at(0.5, 0.5), 1.0);
        for row in 0..64 {
            for column in 0..64 {
                assert_eq!(target.previous(column, row), source.previous(column, row));
            }
        }
    }

    #[test]
    fn impulse_only_touches_texels_inside_radius() {
        let mut source = HeightField::new(128);
        for row in 0..128 {
            for column in 0..128 {
                source.set(column, row, ((column * 7 + row * 3) % 11) as f32 * 0.1, 0.0);
            }
        }
        let cases = [
            (0.5, 0.5, 0.05, 1.0, 1.0),
            (0.2, 0.8, 0.1, -0.5, 16.0 / 9.0),
            (0.9, 0.1, 0.04, 0.1, 0.75),
            (0.0, 0.0, 0.2, 2.0, 1.0),
        ];
        for (x, y, radius, strength, aspect) in cases {
            let impulse = Impulse {
                x,
                y,
                radius,
                strength,
            };
            let mut target = HeightField::new(128);
            inject(&source, &mut target, &impulse, aspect);
            for row in 0..128 {
                for column in 0..128 {
                    let distance =
                        aspect_distance(source.texel_center(column, row), [x, y], aspect);
                    if distance >= radius {
                        assert_eq!(target.height(column, row), source.height(column, row));
                    }
                }
            }
        }
    }

    #[test]
    fn aspect_correction_stretches_x_distance() {
        let flat = HeightField::new(256);
        let mut wide = HeightField::new(256);
        inject(&flat, &mut wide, &press_at(0.5, 0.5), 2.0);
        let touched_columns = (0..256).filter(|&c| wide.height(c, 128) > 0.0).count();
        let touched_rows = (0..256).filter(|&r| wide.height(128, r) > 0.0).count();
        assert!(touched_rows > touched_columns);
        assert!((touched_rows as f32 / touched_columns as f32 - 2.0).abs() < 0.25);
    }

    #[test]
    fn out_of_range_centres_are_ineffective() {
        let flat = HeightField::new(64);
        let mut field = HeightField::new(64);
        inject(&flat, &mut field, &press_at(1.5, -0.5), 1.0);
        assert_eq!(field, flat);
    }

    #[test]
    fn propagation_uses_four_neighbour_rule() {
        let mut source = HeightField::new(8);
        source.set(3, 3, 0.0, 0.25);
        source.set(3, 2, 1.0, 0.0);
        source.set(3, 4, 2.0, 0.0);
        source.set(2, 3, 3.0, 0.0);
        source.set(4, 3, 4.0, 0.0);
        let mut target = HeightField::new(8);
        propagate(&source, &mut target, 0.5);
        let expected = 0.5 * ((1.0 + 2.0 + 3.0 + 4.0) * 0.5 - 0.25);
        assert!((target.height(3, 3) - expected).abs() < 1e-6);
        assert_eq!(target.previous(3, 2), 1.0);
    }

    #[test]
    fn propagation_clamps_at_edges() {
        let mut source = HeightField::new(4);
        source.set(0, 0, 1.0, 0.0);
        let mut target = HeightField::new(4);
        propagate(&source, &mut target, 1.0);
        // Clamped reads count the corner texel as its own north and west neighbour.
        assert!((target.height(0, 0) - 1.0).abs() < 1e-6);
        assert!((target.height(1, 0) - 0.5).abs() < 1e-6);
        assert!((target.height(0, 1) - 0.5).abs() < 1e-6);
        assert_eq!(target.height(3, 3), 0.0);
    }

    fn run(field: HeightField, ticks: usize, damping: f32) -> HeightField {
        let mut current = field;
        let mut next = HeightField::new(current.resolution());
        for _ in 0..ticks {
            propagate(&current, &mut next, damping);
            std::mem::swap(&mut current, &mut next);
        }
        current
    }

    #[test]
    fn energy_decays_at_least_as_fast_as_damping_envelope() {
        let mut field = run(pressed_field(128), 100, 0.985);
        let mut energy = field.energy();
        for _ in 0..5 {
            field = run(field, 100, 0.985);
            let next = field.energy();
            assert!(
                next < energy * 0.3,
                "energy {next} did not decay from {energy} over 100 ticks"
            );
            energy = next;
        }
    }

    #[test]
    fn press_settles_back_to_flat_water() {
        let field = pressed_field(128);
        let initial = field.total_abs_height();
        let settled = run(field, 1200, 0.985);
        assert!(settled.total_abs_height() < initial * 0.01);
    }

    #[test]
    fn full_resolution_ripple_trends_toward_rest() {
        let field = pressed_field(512);
        let initial_peak = field.max_abs_height();
        let at_fifty = run(field, 50, 0.985);
        let at_hundred = run(at_fifty.clone(), 50, 0.985);
        assert!(at_hundred.energy() < at_fifty.energy());
        assert!(at_hundred.max_abs_height() < initial_peak);
    }

    #[test]
    fn flat_water_stays_flat() {
        let field = run(HeightField::new(32), 10, 0.985);
        assert_eq!(field.max_abs_height(), 0.0);
    }

    #[test]
    fn cover_scale_scales_exactly_one_axis() {
        let aspects = [0.5_f32, 0.75, 1.0, 4.0 / 3.0, 16.0 / 9.0, 2.39];
        for canvas in aspects {
            for video in aspects {
                let [sx, sy] = cover_scale(canvas, video);
                assert!(sx >= 1.0 && sy >= 1.0);
                assert!(sx == 1.0 || sy == 1.0, "both axes scaled for {canvas}/{video}");
                let ratio = if canvas > video {
                    canvas / video
                } else {
                    video / canvas
                };
                assert!((sx.max(sy) - ratio).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn video_coord_flips_and_mirrors() {
        assert_eq!(video_coord([0.25, 0.75], [1.0, 1.0], false), [0.25, 0.25]);
        assert_eq!(video_coord([0.25, 0.75], [1.0, 1.0], true), [0.75, 0.25]);
        assert_eq!(video_coord([0.5, 0.5], [2.0, 1.0], true), [0.5, 0.5]);
        assert_eq!(video_coord([0.0, 0.5], [2.0, 1.0], false), [-0.5, 0.5]);
    }

    #[test]
    fn flat_field_has_no_displacement() {
        let field = HeightField::new(64);
        assert_eq!(displacement(&field, [0.3, 0.6]), [0.0, 0.0]);
    }

    #[test]
    fn displacement_follows_gradient() {
        let mut field = HeightField::new(64);
        for row in 0..64 {
            for column in 0..64 {
                // Height rises to the right and towards the top of the screen.
                field.set(column, row, column as f32 * 0.01 + (63 - row) as f32 * 0.02, 0.0);
            }
        }
        let [dx, dy] = displacement(&field, [0.5, 0.5]);
        assert!((dx - 0.02).abs() < 1e-4);
        assert!((dy + 0.04).abs() < 1e-4);
    }

    #[test]
    fn margins_ignore_ripple_strength() {
        let field = pressed_field(128);
        let base = CompositeParams {
            canvas_aspect: 1920.0 / 1080.0,
            video_aspect: 640.0 / 480.0,
            ripple_strength: 0.0,
            mirror: true,
        };
        let strong = CompositeParams {
            ripple_strength: 1.0,
            ..base
        };
        let mut margin_samples = 0;
        for step_y in 0..=20 {
            for step_x in 0..=40 {
                let uv = [step_x as f32 / 40.0, step_y as f32 / 20.0];
                let scale = cover_scale(base.canvas_aspect, base.video_aspect);
                if is_inside_unit(video_coord(uv, scale, true)) {
                    continue;
                }
                margin_samples += 1;
                assert_eq!(
                    composite_coord(&field, uv, &base),
                    composite_coord(&field, uv, &strong)
                );
            }
        }
        assert!(margin_samples > 0);
    }

    #[test]
    fn ripples_displace_inside_video_area() {
        let field = run(pressed_field(128), 5, 0.985);
        let params = CompositeParams {
            canvas_aspect: 1.0,
            video_aspect: 1.0,
            ripple_strength: 0.1,
            mirror: false,
        };
        let still = CompositeParams {
            ripple_strength: 0.0,
            ..params
        };
        let uv = [0.53, 0.5];
        assert_ne!(
            composite_coord(&field, uv, &params),
            composite_coord(&field, uv, &still)
        );
        let coord = composite_coord(&field, uv, &params);
        assert!(is_inside_unit(coord));
    }
}
