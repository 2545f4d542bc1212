//! Traits, helpers and types used across the crate

mod encoding;
mod fmt;
mod id;

/// Public API re-exported primitives.
pub use {
	encoding::{decode, encode, try_encode},
	fmt::Short,
	id::MemberId,
};
