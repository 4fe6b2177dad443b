pub mod error;
pub mod handlers;
pub mod params;
pub mod routes;

pub use error::*;
pub use handlers::*;
pub use params::*;
pub use routes::*;
