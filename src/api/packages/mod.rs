pub mod handler;
pub mod routes;
pub mod serializer;

pub use routes::package_routes;
