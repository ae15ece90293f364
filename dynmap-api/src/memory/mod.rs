//! Memory collaborator interfaces

pub mod interface;
