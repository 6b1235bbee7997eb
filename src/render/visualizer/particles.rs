//! Orbiting particles that pulse with the bands and scatter on onsets.
//!
//! The whole simulation lives in [`ParticleState`]; rendering a sequence is a
//! fold of [`advance`] over the feature rows, so the same seed and features
//! always give the same frames.

use std::f32::consts::TAU;

use image::RgbaImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::StyleContext;
use crate::audio::features::AudioFeatureFrame;
use crate::render::draw::fill_circle;
use crate::render::palette::Color;

pub const DEFAULT_SEED: u64 = 0x5EED;
pub const PARTICLE_COUNT: usize = 200;

/// Frame rate the per-frame constants are tuned for.
const REFERENCE_FPS: f32 = 30.0;
const LIFETIME_SECONDS: (f32, f32) = (4.0, 10.0);
const ONSET_KICK: (f32, f32) = (0.01, 0.04);
const KICK_DAMPING: f32 = 0.85;
const OFFSET_RETURN: f32 = 0.92;

#[derive(Clone, Debug, PartialEq)]
pub struct Particle {
    pub angle: f32,
    /// Orbit radius as a fraction of the shorter canvas side.
    pub orbit: f32,
    /// Radians per reference frame, signed.
    pub angular_velocity: f32,
    pub size: f32,
    pub band: usize,
    /// Outward displacement from the orbit, fraction of the shorter side.
    pub offset: f32,
    pub offset_velocity: f32,
    /// Remaining life in 0.0-1.0.
    pub life: f32,
    pub lifetime: f32,
}

#[derive(Clone, Debug)]
pub struct ParticleState {
    pub particles: Vec<Particle>,
    rng: StdRng,
}

fn spawn(rng: &mut StdRng, index: usize, num_bands: usize, ctx: &StyleContext) -> Particle {
    let direction = if rng.random_bool(0.5) { 1.0 } else { -1.0 };
    Particle {
        angle: rng.random_range(0.0..TAU),
        orbit: rng.random_range(0.15..0.4),
        angular_velocity: rng.random_range(0.005..0.02) * direction,
        size: rng.random_range(2.0..6.0) * ctx.stroke(1.0),
        band: index * num_bands / PARTICLE_COUNT,
        offset: 0.0,
        offset_velocity: 0.0,
        life: 1.0,
        lifetime: rng.random_range(LIFETIME_SECONDS.0..LIFETIME_SECONDS.1),
    }
}

impl ParticleState {
    pub fn new(seed: u64, ctx: &StyleContext) -> Self {
        let num_bands = crate::audio::analysis::NUM_BANDS;
        let mut rng = StdRng::seed_from_u64(seed);
        let mut particles: Vec<Particle> = (0..PARTICLE_COUNT)
            .map(|i| spawn(&mut rng, i, num_bands, ctx))
            .collect();
        // Stagger lifetimes so respawns do not happen all at once.
        for p in &mut particles {
            p.life = rng.random_range(0.2..1.0);
        }
        Self { particles, rng }
    }
}

/// Step the simulation by one frame.
pub fn advance(mut state: ParticleState, frame: &AudioFeatureFrame, ctx: &StyleContext) -> ParticleState {
    let step = REFERENCE_FPS / ctx.fps.max(1) as f32;
    let num_bands = frame.num_bands().max(1);

    for i in 0..state.particles.len() {
        let p = &mut state.particles[i];
        p.life -= step / (REFERENCE_FPS * p.lifetime);
        if p.life <= 0.0 {
            state.particles[i] = spawn(&mut state.rng, i, num_bands, ctx);
            continue;
        }

        let band_val = frame.bands.get(p.band).copied().unwrap_or(0.0);
        p.angle = (p.angle + p.angular_velocity * step * (1.0 + frame.amplitude)).rem_euclid(TAU);

        if frame.onset {
            let kick = state.rng.random_range(ONSET_KICK.0..ONSET_KICK.1);
            let p = &mut state.particles[i];
            p.offset_velocity += kick * (0.5 + band_val);
        }

        let p = &mut state.particles[i];
        p.offset += p.offset_velocity * step;
        p.offset_velocity *= KICK_DAMPING.powf(step);
        p.offset *= OFFSET_RETURN.powf(step);
    }
    state
}

pub fn draw(canvas: &mut RgbaImage, state: &ParticleState, frame: &AudioFeatureFrame, ctx: &StyleContext) {
    let (cx, cy) = ctx.center();
    let min_side = ctx.min_side();
    let num_bands = frame.num_bands().max(1) as f32;
    let base_alpha = (150.0 + frame.amplitude * 100.0) / 255.0;

    for p in &state.particles {
        let band_val = frame.bands.get(p.band).copied().unwrap_or(0.0);
        let pulse = 1.0 + frame.amplitude * 0.5 + band_val * 0.3;
        let radius = (p.orbit * pulse + p.offset) * min_side;
        let (sin, cos) = p.angle.sin_cos();
        let x = cx + radius * cos;
        let y = cy + radius * sin;
        let size = p.size * (1.0 + band_val * 0.5);

        let ratio = p.band as f32 / num_bands;
        let c = ctx.color;
        let color = Color::rgb(
            (c.r as f32 * (1.0 - ratio * 0.5) + 255.0 * ratio * 0.5).min(255.0) as u8,
            (c.g as f32 * (1.0 - ratio * 0.3)) as u8,
            (c.b as f32 * (1.0 - ratio * 0.2) + 100.0 * ratio).min(255.0) as u8,
        );
        // Fade in after spawning and out before respawn.
        let fade = (p.life * 4.0).min((1.0 - p.life) * 20.0 + 0.2).clamp(0.0, 1.0);

        if band_val > 0.5 {
            fill_circle(canvas, x, y, size * 2.0, color, 50.0 / 255.0 * band_val * fade);
        }
        fill_circle(canvas, x, y, size, color, base_alpha * fade);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::visualizer::tests::{blank, ctx, loud_frame};

    fn run(seed: u64, frames: usize) -> Vec<RgbaImage> {
        let c = ctx(160, 120);
        let mut state = ParticleState::new(seed, &c);
        (0..frames)
            .map(|i| {
                state = advance(state.clone(), &loud_frame(i), &c);
                let mut canvas = blank(160, 120);
                draw(&mut canvas, &state, &loud_frame(i), &c);
                canvas
            })
            .collect()
    }

    #[test]
    fn same_seed_same_frames() {
        assert_eq!(run(42, 40), run(42, 40));
    }

    #[test]
    fn different_seed_different_frames() {
        assert_ne!(run(1, 5), run(2, 5));
    }

    #[test]
    fn state_moves_between_frames() {
        let c = ctx(160, 120);
        let start = ParticleState::new(DEFAULT_SEED, &c);
        let next = advance(start.clone(), &loud_frame(1), &c);
        assert_eq!(next.particles.len(), PARTICLE_COUNT);
        assert_ne!(start.particles, next.particles);
    }

    #[test]
    fn onsets_push_particles_outward() {
        let c = ctx(160, 120);
        let state = ParticleState::new(7, &c);
        let mut quiet = loud_frame(1);
        quiet.onset = false;
        let mut hit = quiet.clone();
        hit.onset = true;

        let calm = advance(state.clone(), &quiet, &c);
        let kicked = advance(state, &hit, &c);
        let outward = |s: &ParticleState| s.particles.iter().map(|p| p.offset).sum::<f32>();
        assert!(outward(&kicked) > outward(&calm));
    }

    #[test]
    fn particles_respawn_when_their_life_runs_out() {
        let c = ctx(160, 120);
        let mut state = ParticleState::new(3, &c);
        for p in &mut state.particles {
            p.life = 1e-6;
        }
        let next = advance(state, &loud_frame(1), &c);
        assert!(next.particles.iter().all(|p| p.life == 1.0 && p.offset == 0.0));
    }

    #[test]
    fn orbits_stay_on_canvas_scale() {
        let c = ctx(160, 120);
        let mut state = ParticleState::new(9, &c);
        for i in 0..300 {
            state = advance(state, &loud_frame(i), &c);
        }
        assert!(state.particles.iter().all(|p| p.offset.is_finite() && p.offset < 1.0));
    }
}
