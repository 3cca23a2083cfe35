//! Repository traits for metadata operations.

pub mod chunks;
pub mod files;
pub mod part_files;

pub use chunks::ChunkRepo;
pub use files::FileRepo;
pub use part_files::PartFileRepo;
