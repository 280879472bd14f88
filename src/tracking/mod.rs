pub mod middleware;
pub mod routes;

pub use routes::create_site_router;
