//! Types and traits that are used across multiple components of snowstorm-rs.
//!
//! Other types and traits, specific to single components, can be found in those components' modules,
//! e.g., [`crate::snowstorm`] and [`crate::poll`].

pub mod bag;

pub mod crypto_primitives;

pub mod data_types;
