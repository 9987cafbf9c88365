mod identity_backend_http;
mod profile_repo_rest;
mod reqwest_transport;
mod visit_repo_rest;

pub use identity_backend_http::*;
pub use profile_repo_rest::*;
pub use reqwest_transport::*;
pub use visit_repo_rest::*;
