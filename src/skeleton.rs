use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::file_formats::skeletonfile;
use crate::utils::QuatExt;

/// Local or world transform in TRS form.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TRS {
    pub t: Vec3,
    pub r: Quat,
    pub s: Vec3,
}

impl TRS {
    pub const IDENTITY: TRS = TRS {
        t: Vec3::ZERO,
        r: Quat::IDENTITY,
        s: Vec3::ONE,
    };

    #[inline]
    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.s, self.r, self.t)
    }

    #[inline]
    pub fn from_mat4(m: &Mat4) -> Self {
        let (s, r, t) = m.to_scale_rotation_translation();
        Self { t, r, s }
    }

    /// Compose `self * child`, assuming no shear (standard animation-runtime TRS compose).
    #[inline]
    pub fn mul(&self, child: &TRS) -> TRS {
        TRS {
            t: self.t + self.r * (self.s * child.t),
            r: self.r * child.r,
            s: self.s * child.s,
        }
    }

    #[inline]
    pub fn lerp(&self, other: &TRS, alpha: f32) -> TRS {
        TRS {
            t: self.t.lerp(other.t, alpha),
            r: self.r.nlerp(other.r, alpha),
            s: self.s.lerp(other.s, alpha),
        }
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.t.is_finite() && self.r.is_finite() && self.s.is_finite()
    }
}

#[derive(Clone, Debug)]
pub struct Bone {
    pub name: Option<String>,
    /// Parent index, must be strictly less than the bone's own index.
    pub parent: Option<u32>,
    /// Rest pose local transform.
    pub local: TRS,
    /// 0 for bones the solver must treat as kinematic anchors.
    pub inv_mass: f32,
}

#[derive(Debug, Error)]
pub enum SkeletonError {
    #[error("bone {bone} references parent {parent} out of range ({bones} bones)")]
    ParentOutOfRange { bone: usize, parent: u32, bones: usize },
    #[error("bone {bone} references parent {parent} at or after itself (bones must be parent-first)")]
    ParentNotBefore { bone: usize, parent: u32 },
    #[error("bone {bone} has a non-finite rest transform or inverse mass")]
    NonFinite { bone: usize },
}

/// Bone hierarchy, topologically sorted so a single forward pass
/// propagates world transforms.
pub struct Skeleton {
    bones: Vec<Bone>,
}

impl Skeleton {
    pub fn new(bones: Vec<Bone>) -> Result<Self, SkeletonError> {
        for (i, bone) in bones.iter().enumerate() {
            if let Some(parent) = bone.parent {
                if parent as usize >= bones.len() {
                    return Err(SkeletonError::ParentOutOfRange {
                        bone: i,
                        parent,
                        bones: bones.len(),
                    });
                }
                if parent as usize >= i {
                    return Err(SkeletonError::ParentNotBefore { bone: i, parent });
                }
            }
            if !bone.local.is_finite() || !bone.inv_mass.is_finite() || bone.inv_mass < 0.0 {
                return Err(SkeletonError::NonFinite { bone: i });
            }
        }
        Ok(Self { bones })
    }

    pub fn from_def(def: &skeletonfile::Skeleton) -> Result<Self, SkeletonError> {
        let bones = def
            .bones
            .iter()
            .map(|b| Bone {
                name: b.name.clone(),
                parent: b.parent,
                local: TRS {
                    t: Vec3::from(b.translation),
                    r: Quat::from_array(b.rotation),
                    s: Vec3::from(b.scale),
                },
                inv_mass: b.inv_mass,
            })
            .collect();
        Self::new(bones)
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    pub fn rest_locals(&self) -> Vec<TRS> {
        self.bones.iter().map(|b| b.local).collect()
    }

    /// Single-pass local -> world propagation. `locals` and `out` are indexed
    /// by bone; `out` is cleared and refilled, parents land before children.
    pub fn world_transforms(&self, locals: &[TRS], out: &mut Vec<TRS>) {
        debug_assert_eq!(locals.len(), self.bones.len());
        out.clear();
        for (i, bone) in self.bones.iter().enumerate() {
            let world = match bone.parent {
                Some(p) => out[p as usize].mul(&locals[i]),
                None => locals[i],
            };
            out.push(world);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bone(parent: Option<u32>, t: Vec3) -> Bone {
        Bone {
            name: None,
            parent,
            local: TRS { t, ..TRS::IDENTITY },
            inv_mass: 0.0,
        }
    }

    #[test]
    fn rejects_parent_after_child() {
        let bones = vec![bone(Some(1), Vec3::ZERO), bone(None, Vec3::ZERO)];
        assert!(matches!(
            Skeleton::new(bones),
            Err(SkeletonError::ParentNotBefore { bone: 0, parent: 1 })
        ));
    }

    #[test]
    fn rejects_parent_out_of_range() {
        let bones = vec![bone(None, Vec3::ZERO), bone(Some(7), Vec3::ZERO)];
        assert!(matches!(
            Skeleton::new(bones),
            Err(SkeletonError::ParentOutOfRange { parent: 7, .. })
        ));
    }

    #[test]
    fn world_propagation_chains_translations() {
        let skeleton = Skeleton::new(vec![
            bone(None, Vec3::new(1.0, 0.0, 0.0)),
            bone(Some(0), Vec3::new(0.0, 2.0, 0.0)),
            bone(Some(1), Vec3::new(0.0, 0.0, 3.0)),
        ])
        .unwrap();
        let locals = skeleton.rest_locals();
        let mut world = Vec::new();
        skeleton.world_transforms(&locals, &mut world);
        assert_eq!(world[2].t, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn world_propagation_applies_parent_rotation() {
        let skeleton = Skeleton::new(vec![
            Bone {
                name: None,
                parent: None,
                local: TRS {
                    r: Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
                    ..TRS::IDENTITY
                },
                inv_mass: 0.0,
            },
            bone(Some(0), Vec3::new(1.0, 0.0, 0.0)),
        ])
        .unwrap();
        let locals = skeleton.rest_locals();
        let mut world = Vec::new();
        skeleton.world_transforms(&locals, &mut world);
        // child offset along x rotates onto y
        assert!((world[1].t - Vec3::new(0.0, 1.0, 0.0)).length() < 1e-6);
    }
}
