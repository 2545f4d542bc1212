//! Library-level centralized encoding and decoding utilities that define the
//! byte format of task payloads, direct messages and property values.
//!
//! Currently uses `postcard` as the underlying serialization format.

use {
	bytes::Bytes,
	serde::{Serialize, de::DeserializeOwned},
};

pub fn encode<T: Serialize + ?Sized>(value: &T) -> Bytes {
	postcard::to_allocvec(value)
		.expect("serialization should never fail")
		.into()
}

pub fn try_encode<T: Serialize>(value: &T) -> Result<Bytes, postcard::Error> {
	postcard::to_allocvec(value).map(Bytes::from)
}

pub fn decode<T: DeserializeOwned>(
	bytes: impl AsRef<[u8]>,
) -> Result<T, postcard::Error> {
	postcard::from_bytes(bytes.as_ref())
}
