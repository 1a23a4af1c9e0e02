use serde::{Deserialize, Serialize};

/// A point a constraint can attach to: a skeleton bone (by bone index)
/// or a free simulated particle (by particle index).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Endpoint {
    Bone(u32),
    Particle(u32),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ParticleDef {
    /// Rest position in model space.
    pub position: [f32; 3],
    /// 0 pins the particle in place.
    pub inv_mass: f32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ConstraintDef {
    Distance {
        a: Endpoint,
        b: Endpoint,
        rest_length: f32,
        /// XPBD compliance, 0 = rigid.
        compliance: f32,
    },
    AngularLimit {
        bone: u32,
        /// Max swing away from the rest orientation, radians.
        swing_limit: f32,
        /// Max twist about the bone axis, radians.
        twist_limit: f32,
    },
    Pin {
        target: Endpoint,
        position: [f32; 3],
    },
    CollisionPlane {
        particle: u32,
        normal: [f32; 3],
        offset: f32,
    },
}

/// Per-bone blend setup carried with the graph asset.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BlendDef {
    pub bone: u32,
    /// [0, 1]; 0 passes the kinematic pose through untouched.
    pub weight: f32,
    /// Smoothing time constant in seconds, 0 = no smoothing.
    #[serde(default)]
    pub smoothing: f32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct GraphDefinition {
    pub particles: Vec<ParticleDef>,
    pub constraints: Vec<ConstraintDef>,
    #[serde(default)]
    pub blend: Vec<BlendDef>,
}

impl GraphDefinition {
    /// Append a cable-like chain: fresh particles at `positions`, a distance
    /// constraint from `anchor` to the first particle and between neighbours,
    /// rest lengths taken from the positions as given.
    pub fn push_chain(
        &mut self,
        anchor: Endpoint,
        anchor_position: [f32; 3],
        positions: &[[f32; 3]],
        inv_mass: f32,
        compliance: f32,
    ) {
        let base = self.particles.len() as u32;
        let mut prev = anchor;
        let mut prev_pos = anchor_position;
        for (i, pos) in positions.iter().enumerate() {
            self.particles.push(ParticleDef {
                position: *pos,
                inv_mass,
            });
            let here = Endpoint::Particle(base + i as u32);
            let rest_length = dist(prev_pos, *pos);
            self.constraints.push(ConstraintDef::Distance {
                a: prev,
                b: here,
                rest_length,
                compliance,
            });
            prev = here;
            prev_pos = *pos;
        }
    }
}

fn dist(a: [f32; 3], b: [f32; 3]) -> f32 {
    let d = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
    (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt()
}
