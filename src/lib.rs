#![doc = include_str!("../README.md")]

mod error;

pub mod header;
pub mod mux;
pub mod summary;
pub mod synchronizer;

pub use error::{Error, Result};
