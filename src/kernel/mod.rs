//! Host state behind the trap handler: execution frames and journaled storage.

pub mod exec;
pub mod storage;
