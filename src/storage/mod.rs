//! Storage layer: the file backing that gives pages durability.

mod backing;

pub use backing::FileBacking;
