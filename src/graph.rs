use std::collections::HashMap;

use glam::{Quat, Vec3};
use thiserror::Error;

use crate::file_formats::graphfile::{BlendDef, ConstraintDef, Endpoint, GraphDefinition};
use crate::skeleton::Skeleton;

/// Simulated point for cable-like structures, Verlet-integrated.
#[derive(Clone, Copy, Debug)]
pub struct Particle {
    pub position: Vec3,
    pub prev_position: Vec3,
    /// 0 pins the particle.
    pub inv_mass: f32,
}

/// Runtime form of a constraint; indices resolved, vectors in glam types,
/// plane normals normalized.
#[derive(Clone, Copy, Debug)]
pub enum Constraint {
    Distance {
        a: Endpoint,
        b: Endpoint,
        rest_length: f32,
        compliance: f32,
    },
    AngularLimit {
        bone: u32,
        swing_limit: f32,
        twist_limit: f32,
    },
    Pin {
        target: Endpoint,
        position: Vec3,
    },
    CollisionPlane {
        particle: u32,
        normal: Vec3,
        offset: f32,
    },
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("particle {particle} has a non-finite position or negative inverse mass")]
    BadParticle { particle: usize },
    #[error("constraint {index} references particle {particle} out of range ({particles} particles)")]
    ParticleOutOfRange {
        index: usize,
        particle: u32,
        particles: usize,
    },
    #[error("constraint {index} references bone {bone} out of range ({bones} bones)")]
    BoneOutOfRange { index: usize, bone: u32, bones: usize },
    #[error("constraint {index} connects endpoint {endpoint:?} to itself")]
    SelfConstraint { index: usize, endpoint: Endpoint },
    #[error("constraint {index} has an out-of-domain parameter: {detail}")]
    BadParameter { index: usize, detail: &'static str },
    #[error("constraint {index} duplicates constraint {first}")]
    Duplicate { index: usize, first: usize },
    #[error("angular limit constraint {index} targets root bone {bone}, which has no parent")]
    AngularLimitOnRoot { index: usize, bone: u32 },
    #[error("blend entry {index} is invalid: {detail}")]
    BadBlend { index: usize, detail: &'static str },
    #[error("blend entry {index} references bone {bone} out of range ({bones} bones)")]
    BlendBoneOutOfRange { index: usize, bone: u32, bones: usize },
    #[error("graph is not bound to a skeleton")]
    NotBound,
    #[error("graph was bound to a skeleton with {bound} bones, instance skeleton has {actual}")]
    SkeletonMismatch { bound: usize, actual: usize },
}

/// Per-bone data captured from the skeleton at bind time; what the solver
/// needs without holding a reference to the skeleton itself.
#[derive(Clone, Debug)]
pub(crate) struct BoneBindings {
    pub inv_mass: Vec<f32>,
    pub parent: Vec<Option<u32>>,
    /// Rest local rotations; angular limits clamp the deviation from these.
    pub rest_local_rot: Vec<Quat>,
}

/// Identity of a constraint for duplicate rejection: a constraint may appear
/// once per (kind, endpoints), parameters aside. Distance endpoints are
/// unordered.
#[derive(Hash, PartialEq, Eq)]
enum ConstraintKey {
    Distance(Endpoint, Endpoint),
    AngularLimit(u32),
    Pin(Endpoint),
    CollisionPlane(u32),
}

fn constraint_key(def: &ConstraintDef) -> ConstraintKey {
    match *def {
        ConstraintDef::Distance { a, b, .. } => {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            ConstraintKey::Distance(lo, hi)
        }
        ConstraintDef::AngularLimit { bone, .. } => ConstraintKey::AngularLimit(bone),
        ConstraintDef::Pin { target, .. } => ConstraintKey::Pin(target),
        ConstraintDef::CollisionPlane { particle, .. } => ConstraintKey::CollisionPlane(particle),
    }
}

/// Validated constraint network over one skeleton's bones plus free particles.
/// Immutable after [`bind`](ConstraintGraph::bind) apart from the between-tick
/// tuning path owned by the scheduler.
pub struct ConstraintGraph {
    def: GraphDefinition,
    pub(crate) particles: Vec<Particle>,
    rest_positions: Vec<Vec3>,
    pub(crate) constraints: Vec<Constraint>,
    pub(crate) bones: Option<BoneBindings>,
}

impl ConstraintGraph {
    /// Validate a definition and build the runtime graph. Bone references are
    /// range-checked later in [`bind`](ConstraintGraph::bind), everything else
    /// here.
    pub fn load(def: GraphDefinition) -> Result<Self, GraphError> {
        for (i, p) in def.particles.iter().enumerate() {
            let pos = Vec3::from(p.position);
            if !pos.is_finite() || !p.inv_mass.is_finite() || p.inv_mass < 0.0 {
                return Err(GraphError::BadParticle { particle: i });
            }
        }

        let mut seen: HashMap<ConstraintKey, usize> = HashMap::new();
        let mut constraints = Vec::with_capacity(def.constraints.len());
        for (i, c) in def.constraints.iter().enumerate() {
            if let Some(&first) = seen.get(&constraint_key(c)) {
                return Err(GraphError::Duplicate { index: i, first });
            }
            seen.insert(constraint_key(c), i);

            let runtime = match *c {
                ConstraintDef::Distance {
                    a,
                    b,
                    rest_length,
                    compliance,
                } => {
                    check_endpoint(i, a, def.particles.len())?;
                    check_endpoint(i, b, def.particles.len())?;
                    if a == b {
                        return Err(GraphError::SelfConstraint { index: i, endpoint: a });
                    }
                    if !rest_length.is_finite() || rest_length < 0.0 {
                        return Err(GraphError::BadParameter {
                            index: i,
                            detail: "rest length must be finite and non-negative",
                        });
                    }
                    if !compliance.is_finite() || compliance < 0.0 {
                        return Err(GraphError::BadParameter {
                            index: i,
                            detail: "compliance must be finite and non-negative",
                        });
                    }
                    Constraint::Distance {
                        a,
                        b,
                        rest_length,
                        compliance,
                    }
                }
                ConstraintDef::AngularLimit {
                    bone,
                    swing_limit,
                    twist_limit,
                } => {
                    let ok = |l: f32| l.is_finite() && (0.0..=std::f32::consts::PI).contains(&l);
                    if !ok(swing_limit) || !ok(twist_limit) {
                        return Err(GraphError::BadParameter {
                            index: i,
                            detail: "angular limits must be finite and within [0, pi]",
                        });
                    }
                    Constraint::AngularLimit {
                        bone,
                        swing_limit,
                        twist_limit,
                    }
                }
                ConstraintDef::Pin { target, position } => {
                    check_endpoint(i, target, def.particles.len())?;
                    let position = Vec3::from(position);
                    if !position.is_finite() {
                        return Err(GraphError::BadParameter {
                            index: i,
                            detail: "pin position must be finite",
                        });
                    }
                    Constraint::Pin { target, position }
                }
                ConstraintDef::CollisionPlane {
                    particle,
                    normal,
                    offset,
                } => {
                    if particle as usize >= def.particles.len() {
                        return Err(GraphError::ParticleOutOfRange {
                            index: i,
                            particle,
                            particles: def.particles.len(),
                        });
                    }
                    let normal = Vec3::from(normal);
                    if !normal.is_finite() || !offset.is_finite() || normal.length_squared() < 1e-12 {
                        return Err(GraphError::BadParameter {
                            index: i,
                            detail: "plane needs a non-degenerate finite normal and finite offset",
                        });
                    }
                    Constraint::CollisionPlane {
                        particle,
                        normal: normal.normalize(),
                        offset,
                    }
                }
            };
            constraints.push(runtime);
        }

        for (i, b) in def.blend.iter().enumerate() {
            if !b.weight.is_finite() || !(0.0..=1.0).contains(&b.weight) {
                return Err(GraphError::BadBlend {
                    index: i,
                    detail: "weight must be within [0, 1]",
                });
            }
            if !b.smoothing.is_finite() || b.smoothing < 0.0 {
                return Err(GraphError::BadBlend {
                    index: i,
                    detail: "smoothing must be finite and non-negative",
                });
            }
            if def.blend[..i].iter().any(|other| other.bone == b.bone) {
                return Err(GraphError::BadBlend {
                    index: i,
                    detail: "bone appears in more than one blend entry",
                });
            }
        }

        let rest_positions: Vec<Vec3> = def.particles.iter().map(|p| Vec3::from(p.position)).collect();
        let particles = def
            .particles
            .iter()
            .map(|p| Particle {
                position: Vec3::from(p.position),
                prev_position: Vec3::from(p.position),
                inv_mass: p.inv_mass,
            })
            .collect();

        log::debug!(
            target: "pose_control::graph",
            "loaded graph: {} particles, {} constraints, {} blend entries",
            def.particles.len(),
            def.constraints.len(),
            def.blend.len()
        );

        Ok(Self {
            def,
            particles,
            rest_positions,
            constraints,
            bones: None,
        })
    }

    /// Resolve bone references against a live skeleton and capture the
    /// per-bone data the solver needs.
    pub fn bind(&mut self, skeleton: &Skeleton) -> Result<(), GraphError> {
        let bones = skeleton.len();
        for (i, c) in self.constraints.iter().enumerate() {
            for bone in c.bone_refs() {
                if bone as usize >= bones {
                    return Err(GraphError::BoneOutOfRange { index: i, bone, bones });
                }
            }
            if let Constraint::AngularLimit { bone, .. } = *c {
                if skeleton.bones()[bone as usize].parent.is_none() {
                    return Err(GraphError::AngularLimitOnRoot { index: i, bone });
                }
            }
        }
        for (i, b) in self.def.blend.iter().enumerate() {
            if b.bone as usize >= bones {
                return Err(GraphError::BlendBoneOutOfRange {
                    index: i,
                    bone: b.bone,
                    bones,
                });
            }
        }

        self.bones = Some(BoneBindings {
            inv_mass: skeleton.bones().iter().map(|b| b.inv_mass).collect(),
            parent: skeleton.bones().iter().map(|b| b.parent).collect(),
            rest_local_rot: skeleton.bones().iter().map(|b| b.local.r).collect(),
        });
        Ok(())
    }

    pub fn is_bound(&self) -> bool {
        self.bones.is_some()
    }

    /// Bone count of the skeleton this graph was bound against.
    pub fn bound_bone_count(&self) -> Option<usize> {
        self.bones.as_ref().map(|b| b.inv_mass.len())
    }

    /// The definition this graph was loaded from; loading it again produces
    /// an identical graph.
    pub fn serialize(&self) -> GraphDefinition {
        self.def.clone()
    }

    pub fn blend_defs(&self) -> &[BlendDef] {
        &self.def.blend
    }

    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Split borrows for one solver pass: constraints stay immutable while
    /// particle state is corrected in place.
    pub(crate) fn solve_parts(&mut self) -> (&[Constraint], &mut [Particle], Option<&BoneBindings>) {
        (&self.constraints, &mut self.particles, self.bones.as_ref())
    }

    /// Drop all accumulated particle motion, e.g. after a diverged tick.
    pub fn reset_particles(&mut self) {
        for (p, rest) in self.particles.iter_mut().zip(&self.rest_positions) {
            p.position = *rest;
            p.prev_position = *rest;
        }
    }
}

impl Constraint {
    fn bone_refs(&self) -> impl Iterator<Item = u32> {
        let pair = match *self {
            Constraint::Distance { a, b, .. } => [endpoint_bone(a), endpoint_bone(b)],
            Constraint::AngularLimit { bone, .. } => [Some(bone), None],
            Constraint::Pin { target, .. } => [endpoint_bone(target), None],
            Constraint::CollisionPlane { .. } => [None, None],
        };
        pair.into_iter().flatten()
    }
}

fn endpoint_bone(e: Endpoint) -> Option<u32> {
    match e {
        Endpoint::Bone(b) => Some(b),
        Endpoint::Particle(_) => None,
    }
}

fn check_endpoint(index: usize, e: Endpoint, particles: usize) -> Result<(), GraphError> {
    if let Endpoint::Particle(p) = e {
        if p as usize >= particles {
            return Err(GraphError::ParticleOutOfRange {
                index,
                particle: p,
                particles,
            });
        }
    }
    Ok(())
}
