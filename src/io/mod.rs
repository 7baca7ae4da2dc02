mod ply;
pub use ply::write_ply;
