use {
	core::{convert::Infallible, fmt, str::FromStr},
	derive_more::From,
	serde::{Deserialize, Serialize},
};

/// Uniquely identifies a member within a group.
///
/// Member ids are chosen by clients. A member that wants a stable, revivable
/// identity picks its own id; anonymous members mint a random one with
/// [`MemberId::random`].
///
/// Notes:
///  - ids are compared and ordered as plain strings,
///  - random ids are 16 random bytes rendered as lowercase hex, which makes
///    collisions between independently minted ids practically impossible.
#[derive(
	Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, From,
)]
pub struct MemberId(String);

impl MemberId {
	/// Mints a fresh random member id.
	///
	/// Used for anonymous joins where the caller does not care about a stable
	/// identity. The id is generated client-side; the state machine never mints
	/// ids.
	pub fn random() -> Self {
		Self(hex::encode(rand::random::<[u8; 16]>()))
	}

	/// Returns the id as a string slice.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl From<&str> for MemberId {
	fn from(s: &str) -> Self {
		Self(s.to_owned())
	}
}

impl FromStr for MemberId {
	type Err = Infallible;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self(s.to_owned()))
	}
}

impl AsRef<str> for MemberId {
	fn as_ref(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for MemberId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl fmt::Debug for MemberId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "MemberId({})", self.0)
	}
}
