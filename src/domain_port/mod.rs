// identity

mod credential_store;
mod identity_backend;

pub use credential_store::*;
pub use identity_backend::*;

// transport

mod http_transport;

pub use http_transport::*;

// repo

mod profile_repo;
mod visit_repo;

pub use profile_repo::*;
pub use visit_repo::*;
