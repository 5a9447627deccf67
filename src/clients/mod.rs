//! Facades over the [`ContainerClient`](service_framework::ContainerClient).

pub mod cast_directory;

pub use cast_directory::*;
