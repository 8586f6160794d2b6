//! Registry trait for self-registering implementations.
//!
//! Every pluggable component (storage backend, order source, partner gateway)
//! exposes a `Registry` type implementing this trait, tying the name used in
//! the configuration file to the factory that builds it.

/// Base trait for implementation registries.
pub trait ImplementationRegistry {
	/// The name used in configuration files to reference this implementation,
	/// e.g. `"file"` for `[storage.implementations.file]` or `"simulated"` for
	/// `[delivery.implementations.simulated]`.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Get the factory function for this implementation.
	fn factory() -> Self::Factory;
}
