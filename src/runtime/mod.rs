//! Runtime adapters for executing job futures.

pub mod tokio_spawner;

pub use tokio_spawner::TokioSpawner;
