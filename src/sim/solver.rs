use glam::{Quat, Vec3};

use crate::config::SimConfig;
use crate::file_formats::graphfile::Endpoint;
use crate::graph::{BoneBindings, Constraint, ConstraintGraph, Particle};
use crate::sim::StepError;
use crate::skeleton::TRS;

#[derive(Clone, Copy, Debug)]
pub struct SolverParams {
    pub iterations: u32,
    pub stiffness_scale: f32,
    pub divergence_bound: f32,
}

impl SolverParams {
    pub fn from_config(config: &SimConfig) -> Self {
        Self {
            iterations: config.iterations,
            stiffness_scale: config.stiffness_scale,
            divergence_bound: config.divergence_bound,
        }
    }
}

/// One Gauss-Seidel pass set over all constraints: `iterations` sweeps in
/// declaration order (fixed order keeps runs deterministic), then a sanity
/// scan of every solved position. `pose` is the physical world pose being
/// corrected in place.
pub fn project(
    graph: &mut ConstraintGraph,
    pose: &mut [TRS],
    params: &SolverParams,
    dt: f32,
    substep: u32,
) -> Result<(), StepError> {
    let (constraints, particles, bones) = graph.solve_parts();
    let bones = bones.expect("graph must be bound before solving");
    let stiffness_scale = params.stiffness_scale.max(1e-6);
    let dt2 = (dt * dt).max(1e-12);

    for _ in 0..params.iterations {
        for c in constraints {
            match *c {
                Constraint::Distance {
                    a,
                    b,
                    rest_length,
                    compliance,
                } => {
                    let pa = point_pos(a, pose, particles);
                    let pb = point_pos(b, pose, particles);
                    let wa = point_inv_mass(a, bones, particles);
                    let wb = point_inv_mass(b, bones, particles);
                    let w_sum = wa + wb;
                    if w_sum == 0.0 {
                        continue;
                    }
                    let d = pb - pa;
                    let len = d.length();
                    if len < 1e-9 {
                        continue;
                    }
                    let alpha = compliance / stiffness_scale / dt2;
                    let err = len - rest_length;
                    let lambda = err / (w_sum + alpha);
                    let dir = d / len;
                    nudge_point(a, dir * (lambda * wa), pose, particles);
                    nudge_point(b, -dir * (lambda * wb), pose, particles);
                }
                Constraint::AngularLimit {
                    bone,
                    swing_limit,
                    twist_limit,
                } => {
                    let parent = bones.parent[bone as usize]
                        .expect("bind rejects angular limits on roots");
                    let q_parent = pose[parent as usize].r;
                    let rest = bones.rest_local_rot[bone as usize];
                    let rel = q_parent.inverse() * pose[bone as usize].r;
                    let delta = (rest.inverse() * rel).normalize();
                    let (swing, twist) = swing_twist(delta, Vec3::X);
                    let clamped =
                        clamp_rotation(swing, swing_limit) * clamp_rotation(twist, twist_limit);
                    pose[bone as usize].r = (q_parent * rest * clamped).normalize();
                }
                Constraint::Pin { target, position } => {
                    set_point(target, position, pose, particles);
                }
                Constraint::CollisionPlane {
                    particle,
                    normal,
                    offset,
                } => {
                    let p = &mut particles[particle as usize];
                    if p.inv_mass == 0.0 {
                        continue;
                    }
                    let depth = normal.dot(p.position) - offset;
                    if depth < 0.0 {
                        p.position -= normal * depth;
                    }
                }
            }
        }
    }

    check_finite(particles, pose, params.divergence_bound, substep)
}

fn point_pos(e: Endpoint, pose: &[TRS], particles: &[Particle]) -> Vec3 {
    match e {
        Endpoint::Bone(b) => pose[b as usize].t,
        Endpoint::Particle(p) => particles[p as usize].position,
    }
}

fn point_inv_mass(e: Endpoint, bones: &BoneBindings, particles: &[Particle]) -> f32 {
    match e {
        Endpoint::Bone(b) => bones.inv_mass[b as usize],
        Endpoint::Particle(p) => particles[p as usize].inv_mass,
    }
}

fn nudge_point(e: Endpoint, delta: Vec3, pose: &mut [TRS], particles: &mut [Particle]) {
    match e {
        Endpoint::Bone(b) => pose[b as usize].t += delta,
        Endpoint::Particle(p) => particles[p as usize].position += delta,
    }
}

fn set_point(e: Endpoint, position: Vec3, pose: &mut [TRS], particles: &mut [Particle]) {
    match e {
        Endpoint::Bone(b) => pose[b as usize].t = position,
        Endpoint::Particle(p) => particles[p as usize].position = position,
    }
}

/// Decompose `q` into swing * twist, twist about `axis`.
fn swing_twist(q: Quat, axis: Vec3) -> (Quat, Quat) {
    let r = Vec3::new(q.x, q.y, q.z);
    let proj = axis * r.dot(axis);
    let twist = Quat::from_xyzw(proj.x, proj.y, proj.z, q.w);
    let twist = if twist.length_squared() < 1e-12 {
        Quat::IDENTITY
    } else {
        twist.normalize()
    };
    let swing = q * twist.inverse();
    (swing, twist)
}

/// Scale `q` down to at most `max_angle` radians away from identity.
fn clamp_rotation(q: Quat, max_angle: f32) -> Quat {
    // take the short cover so the angle lands in [0, pi]
    let q = if q.w < 0.0 { -q } else { q };
    let angle = 2.0 * q.w.clamp(-1.0, 1.0).acos();
    if angle <= max_angle || angle < 1e-7 {
        q
    } else {
        Quat::IDENTITY.slerp(q, max_angle / angle)
    }
}

fn check_finite(
    particles: &[Particle],
    pose: &[TRS],
    bound: f32,
    substep: u32,
) -> Result<(), StepError> {
    let bound2 = bound * bound;
    for p in particles {
        if !p.position.is_finite() {
            return Err(StepError::Diverged {
                substep,
                detail: "particle position is non-finite",
            });
        }
        if p.position.length_squared() > bound2 {
            return Err(StepError::Diverged {
                substep,
                detail: "particle position exceeded sanity bound",
            });
        }
    }
    for t in pose {
        if !t.is_finite() {
            return Err(StepError::Diverged {
                substep,
                detail: "bone transform is non-finite",
            });
        }
        if t.t.length_squared() > bound2 {
            return Err(StepError::Diverged {
                substep,
                detail: "bone translation exceeded sanity bound",
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_formats::graphfile::{ConstraintDef, GraphDefinition, ParticleDef};
    use crate::sim::chain;
    use crate::skeleton::{Bone, Skeleton};

    fn params() -> SolverParams {
        SolverParams {
            iterations: 8,
            stiffness_scale: 1.0,
            divergence_bound: 1.0e4,
        }
    }

    fn skeleton_pair() -> Skeleton {
        Skeleton::new(vec![
            Bone {
                name: None,
                parent: None,
                local: TRS::IDENTITY,
                inv_mass: 0.0,
            },
            Bone {
                name: None,
                parent: Some(0),
                local: TRS {
                    t: Vec3::new(0.0, -1.0, 0.0),
                    ..TRS::IDENTITY
                },
                inv_mass: 1.0,
            },
        ])
        .unwrap()
    }

    fn bound_graph(def: GraphDefinition, skeleton: &Skeleton) -> ConstraintGraph {
        let mut graph = ConstraintGraph::load(def).unwrap();
        graph.bind(skeleton).unwrap();
        graph
    }

    #[test]
    fn hanging_chain_satisfies_rest_length() {
        let skeleton = skeleton_pair();
        let mut def = GraphDefinition::default();
        def.particles.push(ParticleDef {
            position: [0.0, 1.0, 0.0],
            inv_mass: 0.0, // pinned anchor
        });
        def.particles.push(ParticleDef {
            position: [0.0, 0.5, 0.0],
            inv_mass: 1.0,
        });
        def.constraints.push(ConstraintDef::Distance {
            a: Endpoint::Particle(0),
            b: Endpoint::Particle(1),
            rest_length: 0.5,
            compliance: 0.0,
        });
        let mut graph = bound_graph(def, &skeleton);
        let mut pose = vec![TRS::IDENTITY; 2];

        let dt = 1.0 / 240.0;
        for substep in 0..480 {
            {
                let (_, particles, _) = graph.solve_parts();
                chain::integrate(particles, Vec3::new(0.0, -9.81, 0.0), 0.01, dt);
            }
            project(&mut graph, &mut pose, &params(), dt, substep).unwrap();
        }

        let a = graph.particles()[0].position;
        let b = graph.particles()[1].position;
        let len = (a - b).length();
        assert!((len - 0.5).abs() <= 0.5 * 1e-3, "len = {len}");
        // gravity pulled the free end below the anchor
        assert!(b.y < a.y);
    }

    #[test]
    fn pin_forces_bone_to_target() {
        let skeleton = skeleton_pair();
        let mut def = GraphDefinition::default();
        def.constraints.push(ConstraintDef::Pin {
            target: Endpoint::Bone(1),
            position: [0.25, -0.75, 0.0],
        });
        let mut graph = bound_graph(def, &skeleton);
        let mut pose = vec![
            TRS::IDENTITY,
            TRS {
                t: Vec3::new(0.0, -1.0, 0.0),
                ..TRS::IDENTITY
            },
        ];
        project(&mut graph, &mut pose, &params(), 1.0 / 60.0, 0).unwrap();
        assert_eq!(pose[1].t, Vec3::new(0.25, -0.75, 0.0));
    }

    #[test]
    fn collision_plane_pushes_particle_out() {
        let skeleton = skeleton_pair();
        let mut def = GraphDefinition::default();
        def.particles.push(ParticleDef {
            position: [0.0, -0.4, 0.0],
            inv_mass: 1.0,
        });
        def.constraints.push(ConstraintDef::CollisionPlane {
            particle: 0,
            normal: [0.0, 1.0, 0.0],
            offset: 0.0,
        });
        let mut graph = bound_graph(def, &skeleton);
        let mut pose = vec![TRS::IDENTITY; 2];
        project(&mut graph, &mut pose, &params(), 1.0 / 60.0, 0).unwrap();
        assert!(graph.particles()[0].position.y >= -1e-6);
    }

    #[test]
    fn angular_limit_clamps_swing() {
        let skeleton = skeleton_pair();
        let mut def = GraphDefinition::default();
        let limit = std::f32::consts::FRAC_PI_4;
        def.constraints.push(ConstraintDef::AngularLimit {
            bone: 1,
            swing_limit: limit,
            twist_limit: 0.0,
        });
        let mut graph = bound_graph(def, &skeleton);
        // child swung 90 degrees about z away from rest
        let mut pose = vec![
            TRS::IDENTITY,
            TRS {
                t: Vec3::new(0.0, -1.0, 0.0),
                r: Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
                ..TRS::IDENTITY
            },
        ];
        project(&mut graph, &mut pose, &params(), 1.0 / 60.0, 0).unwrap();
        let angle = pose[1].r.angle_between(Quat::IDENTITY);
        assert!((angle - limit).abs() < 1e-3, "angle = {angle}");
    }

    #[test]
    fn divergence_is_reported_not_propagated() {
        let skeleton = skeleton_pair();
        let mut def = GraphDefinition::default();
        def.particles.push(ParticleDef {
            position: [0.0, 0.0, 0.0],
            inv_mass: 1.0,
        });
        let mut graph = bound_graph(def, &skeleton);
        graph.solve_parts().1[0].position = Vec3::new(1.0e9, 0.0, 0.0);
        let mut pose = vec![TRS::IDENTITY; 2];
        let res = project(&mut graph, &mut pose, &params(), 1.0 / 60.0, 3);
        assert!(matches!(res, Err(StepError::Diverged { substep: 3, .. })));

        graph.solve_parts().1[0].position = Vec3::new(f32::NAN, 0.0, 0.0);
        let res = project(&mut graph, &mut pose, &params(), 1.0 / 60.0, 0);
        assert!(matches!(res, Err(StepError::Diverged { .. })));
    }

    #[test]
    fn stiffness_sweep_never_goes_non_finite() {
        for exp in -6..=6 {
            let scale = 10f32.powi(exp);
            let skeleton = skeleton_pair();
            let mut def = GraphDefinition::default();
            def.push_chain(
                Endpoint::Bone(0),
                [0.0, 0.0, 0.0],
                &[[0.0, -0.25, 0.0], [0.0, -0.5, 0.0], [0.0, -0.75, 0.0]],
                1.0,
                1e-4,
            );
            let mut graph = bound_graph(def, &skeleton);
            let mut pose = vec![TRS::IDENTITY; 2];
            let p = SolverParams {
                iterations: 4,
                stiffness_scale: scale,
                divergence_bound: 1.0e4,
            };
            let dt = 1.0 / 240.0;
            for substep in 0..240 {
                {
                    let (_, particles, _) = graph.solve_parts();
                    chain::integrate(particles, Vec3::new(0.0, -9.81, 0.0), 0.0, dt);
                }
                match project(&mut graph, &mut pose, &p, dt, substep) {
                    Ok(()) => {
                        for part in graph.particles() {
                            assert!(part.position.is_finite());
                        }
                    }
                    Err(StepError::Diverged { .. }) => break, // reported, never silently NaN
                }
            }
        }
    }
}
