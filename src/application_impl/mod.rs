mod access_resolver;
mod aggregate_cache;
mod notice_board;
mod profile_service_impl;
mod session_manager;
mod visit_synchronizer;

pub use access_resolver::*;
pub use aggregate_cache::*;
pub use notice_board::*;
pub use profile_service_impl::*;
pub use session_manager::*;
pub use visit_synchronizer::*;
