#![allow(unused)]

mod tracing;

pub use time::*;
