//! In-process adapters. Back the "fake" backend settings and the tests.

mod credential_store_memory;
mod identity_backend_fake;
mod profile_repo_memory;
mod record_store_memory;
mod visit_repo_memory;

pub use credential_store_memory::*;
pub use identity_backend_fake::*;
pub use profile_repo_memory::*;
pub use record_store_memory::*;
pub use visit_repo_memory::*;
