use crate::file_formats::graphfile::BlendDef;
use crate::skeleton::TRS;
use crate::utils::smooth_damp;

/// Per-bone blend between the kinematic and the solved pose. Weights move
/// toward their targets through a critically damped spring so live weight
/// changes never pop.
pub struct BlendState {
    weights: Vec<f32>,
    targets: Vec<f32>,
    velocities: Vec<f32>,
    /// Seconds; 0 snaps to the target immediately.
    smoothing: Vec<f32>,
}

impl BlendState {
    /// All-zero weights: every bone passes the kinematic pose through.
    pub fn new(bone_count: usize) -> Self {
        Self {
            weights: vec![0.0; bone_count],
            targets: vec![0.0; bone_count],
            velocities: vec![0.0; bone_count],
            smoothing: vec![0.0; bone_count],
        }
    }

    pub fn from_defs(bone_count: usize, defs: &[BlendDef]) -> Self {
        let mut state = Self::new(bone_count);
        for def in defs {
            let i = def.bone as usize;
            state.weights[i] = def.weight;
            state.targets[i] = def.weight;
            state.smoothing[i] = def.smoothing;
        }
        state
    }

    /// Takes effect over `smoothing` seconds, immediately when 0.
    pub fn set_target(&mut self, bone: u32, weight: f32) {
        if let Some(t) = self.targets.get_mut(bone as usize) {
            *t = weight.clamp(0.0, 1.0);
            if self.smoothing[bone as usize] <= 0.0 {
                self.weights[bone as usize] = *t;
                self.velocities[bone as usize] = 0.0;
            }
        }
    }

    pub fn weight(&self, bone: u32) -> f32 {
        self.weights[bone as usize]
    }

    /// Advance smoothed weights one tick.
    pub fn update(&mut self, dt: f32) {
        for i in 0..self.weights.len() {
            if self.weights[i] == self.targets[i] {
                self.velocities[i] = 0.0;
                continue;
            }
            let (w, v) = smooth_damp(
                self.weights[i],
                self.velocities[i],
                self.targets[i],
                self.smoothing[i],
                dt,
            );
            self.weights[i] = w.clamp(0.0, 1.0);
            self.velocities[i] = v;
        }
    }

    /// Write the final pose: weight 0 is exactly the kinematic transform,
    /// weight 1 exactly the solved one.
    pub fn blend(&self, kinematic: &[TRS], physical: &[TRS], out: &mut Vec<TRS>) {
        debug_assert_eq!(kinematic.len(), self.weights.len());
        debug_assert_eq!(physical.len(), self.weights.len());
        out.clear();
        for i in 0..self.weights.len() {
            let w = self.weights[i];
            let t = if w <= 0.0 {
                kinematic[i]
            } else if w >= 1.0 {
                physical[i]
            } else {
                kinematic[i].lerp(&physical[i], w)
            };
            out.push(t);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};

    fn poses() -> (Vec<TRS>, Vec<TRS>) {
        let kin = vec![TRS::IDENTITY];
        let phys = vec![TRS {
            t: Vec3::new(2.0, 0.0, 0.0),
            r: Quat::from_rotation_y(0.8),
            s: Vec3::ONE,
        }];
        (kin, phys)
    }

    #[test]
    fn weight_zero_is_exactly_kinematic() {
        let (kin, phys) = poses();
        let blend = BlendState::new(1);
        let mut out = Vec::new();
        blend.blend(&kin, &phys, &mut out);
        assert_eq!(out[0], kin[0]);
    }

    #[test]
    fn weight_one_is_exactly_physical() {
        let (kin, phys) = poses();
        let mut blend = BlendState::new(1);
        blend.set_target(0, 1.0);
        let mut out = Vec::new();
        blend.blend(&kin, &phys, &mut out);
        assert_eq!(out[0], phys[0]);
    }

    #[test]
    fn interpolation_is_monotone_in_weight() {
        let (kin, phys) = poses();
        let mut blend = BlendState::new(1);
        let mut out = Vec::new();
        let mut prev_dist = -1.0f32;
        for step in 0..=10 {
            blend.set_target(0, step as f32 / 10.0);
            blend.blend(&kin, &phys, &mut out);
            let dist = (out[0].t - kin[0].t).length();
            assert!(dist >= prev_dist - 1e-6, "distance regressed at step {step}");
            prev_dist = dist;
        }
    }

    #[test]
    fn smoothed_weight_approaches_target_without_popping() {
        let mut blend = BlendState::from_defs(
            1,
            &[BlendDef {
                bone: 0,
                weight: 0.0,
                smoothing: 0.05,
            }],
        );
        blend.set_target(0, 1.0);
        let mut prev = blend.weight(0);
        for _ in 0..120 {
            blend.update(1.0 / 60.0);
            let w = blend.weight(0);
            assert!(w >= prev - 1e-4, "weight popped backwards");
            assert!((0.0..=1.0).contains(&w));
            prev = w;
        }
        assert!((blend.weight(0) - 1.0).abs() < 1e-2);
    }

    #[test]
    fn zero_smoothing_snaps() {
        let mut blend = BlendState::new(1);
        blend.set_target(0, 0.6);
        assert_eq!(blend.weight(0), 0.6);
    }
}
