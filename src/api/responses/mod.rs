pub mod handler;
pub mod routes;
pub mod serializer;

pub use routes::response_routes;
