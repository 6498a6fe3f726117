//! Pure, I/O-free stages of the scan: deciding which changed files are worth
//! analyzing, and cutting their patches into size-bounded chunks.

pub mod chunker;
pub mod filter;
