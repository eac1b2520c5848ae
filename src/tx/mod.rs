pub mod assembler;
pub mod trace;
pub mod types;
