// storage/mod.rs - Component storage

mod buffer;
mod vector;

pub use vector::ComponentVector;
