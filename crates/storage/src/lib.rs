#![forbid(unsafe_code)]

pub mod fallback;
pub mod repository;
pub mod sqlite;
