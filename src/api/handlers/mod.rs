//! Request handlers. Thin plumbing: body-shape checks and JSON mapping;
//! all real decisions live in the guard, the denormalizer, the credential
//! lifecycle and the store.

pub mod applications;
pub mod clients;
pub mod health;
pub mod me;
pub mod resources;
pub mod roles;
pub mod tokens;
pub mod users;
