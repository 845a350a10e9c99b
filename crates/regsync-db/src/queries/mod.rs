//! Query modules for the source database.

pub mod views;
