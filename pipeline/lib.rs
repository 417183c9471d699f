#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

pub mod align;
pub mod artifacts;
pub mod builder;
pub mod data;
pub mod infer;
pub mod model;
pub mod preprocessor;
pub mod types;
