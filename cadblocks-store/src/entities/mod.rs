pub mod blocks;
pub mod files;
