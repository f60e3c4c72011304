pub mod fare;
pub mod id_generator;
