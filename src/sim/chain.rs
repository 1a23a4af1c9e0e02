use glam::Vec3;

use crate::graph::Particle;

/// Velocity-free Verlet step: `next = current + (current - prev) * (1 - damping)
/// + accel * dt^2`. Mutates particles in place; nothing allocates here.
pub fn integrate(particles: &mut [Particle], gravity: Vec3, damping: f32, dt: f32) {
    let accel = gravity * dt * dt;
    let keep = 1.0 - damping.clamp(0.0, 1.0);
    for p in particles.iter_mut() {
        if p.inv_mass == 0.0 {
            p.prev_position = p.position;
            continue;
        }
        let velocity = p.position - p.prev_position;
        let next = p.position + velocity * keep + accel;
        p.prev_position = p.position;
        p.position = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn particle(position: Vec3, inv_mass: f32) -> Particle {
        Particle {
            position,
            prev_position: position,
            inv_mass,
        }
    }

    #[test]
    fn gravity_accelerates_free_particle() {
        let mut particles = vec![particle(Vec3::ZERO, 1.0)];
        let dt = 1.0 / 240.0;
        let gravity = Vec3::new(0.0, -9.81, 0.0);
        for _ in 0..240 {
            integrate(&mut particles, gravity, 0.0, dt);
        }
        // after 1s of free fall: y ~ -g/2, Verlet is within a few percent at this dt
        let y = particles[0].position.y;
        assert!(y < -4.5 && y > -5.3, "y = {y}");
    }

    #[test]
    fn pinned_particle_does_not_move() {
        let mut particles = vec![particle(Vec3::new(1.0, 2.0, 3.0), 0.0)];
        for _ in 0..60 {
            integrate(&mut particles, Vec3::new(0.0, -9.81, 0.0), 0.0, 1.0 / 60.0);
        }
        assert_eq!(particles[0].position, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn full_damping_kills_velocity() {
        let mut p = particle(Vec3::ZERO, 1.0);
        p.prev_position = Vec3::new(-1.0, 0.0, 0.0); // moving +x
        let mut particles = vec![p];
        integrate(&mut particles, Vec3::ZERO, 1.0, 1.0 / 60.0);
        assert_eq!(particles[0].position, Vec3::ZERO);
    }
}
