#[macro_use]
extern crate serde_derive;

mod data;
mod error;
mod features;
mod forecast;
mod math;
mod tree;

pub use crate::data::*;
pub use crate::error::*;
pub use crate::features::*;
pub use crate::forecast::*;
pub use crate::math::*;
pub use crate::tree::*;

pub(crate) static DEFAULT_MAX_DEPTH: usize = 4;
pub(crate) static DEFAULT_MIN_LEAF: usize = 8;
pub(crate) static DEFAULT_MIN_GAIN: f64 = 1e-12;
pub(crate) static DEFAULT_LAGS: [usize; 3] = [1, 2, 3];
pub(crate) static MIN_TRAIN_EXAMPLES: usize = 20;
