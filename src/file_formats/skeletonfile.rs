use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Bone {
    pub name: Option<String>,
    /// None for roots; otherwise an index strictly less than this bone's own.
    pub parent: Option<u32>,
    pub translation: [f32; 3],
    /// xyzw
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
    /// 0 marks the bone as a kinematic anchor for the solver.
    #[serde(default)]
    pub inv_mass: f32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Skeleton {
    pub bones: Vec<Bone>,
}
