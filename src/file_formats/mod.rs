pub mod graphfile;
pub mod skeletonfile;
