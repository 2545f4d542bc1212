use {
	core::{net::SocketAddr, time::Duration},
	derive_builder::Builder,
};

/// Configuration options for a group client.
#[derive(Debug, Clone, Builder)]
#[builder(pattern = "owned", setter(prefix = "with"))]
#[builder_struct_attr(doc(hidden))]
pub struct GroupConfig {
	/// How long to wait after a persistent member's session drops before
	/// declaring it gone to the rest of the group. Zero means immediately.
	///
	/// Must be identical on every client of the same group since it
	/// parametrizes the replicated state machine.
	#[builder(default)]
	pub expiration: Duration,

	/// Optional direct-message endpoint advertised in this client's member
	/// info. When absent, only replicated tasks are available for reaching
	/// members owned by this client.
	#[builder(default)]
	pub address: Option<SocketAddr>,
}

impl Default for GroupConfig {
	fn default() -> Self {
		Self {
			expiration: Duration::ZERO,
			address: None,
		}
	}
}

impl GroupConfig {
	/// Creates a new config builder with default values.
	pub fn builder() -> GroupConfigBuilder {
		GroupConfigBuilder::default()
	}
}
