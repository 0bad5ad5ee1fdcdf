#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod callback;
mod config;
mod error;
mod mutex;
mod optimizer;
mod value;

pub use crate::callback::*;
pub use crate::config::*;
pub use crate::error::*;
pub use crate::optimizer::*;
pub use crate::value::*;
