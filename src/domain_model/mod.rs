mod access;
mod http;
mod profile;
mod session;
mod unit;
mod user;
mod visit;

pub use access::*;
pub use http::*;
pub use profile::*;
pub use session::*;
pub use unit::*;
pub use user::*;
pub use visit::*;
