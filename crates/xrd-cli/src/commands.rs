pub mod calculate;
pub mod refine;
