pub mod checksum;
pub mod error;
pub mod item;
