pub mod encoder;
pub mod file;
pub mod header;
pub mod page;
