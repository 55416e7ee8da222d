#![doc = include_str!("../README.md")]

mod error;

pub mod accessor;
pub mod integrity;
pub mod interface;
pub mod packet;
pub mod protocol;
pub mod stream;

pub use error::{Error, Result};
