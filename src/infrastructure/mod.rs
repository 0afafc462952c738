//! Adapters for the domain ports: storage backends, the simulated provider and
//! notification sinks.

pub mod in_memory;
pub mod notifier;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod simulated_provider;
