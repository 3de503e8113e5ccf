mod convert;
mod error;
mod extract;
mod handlers;
mod media;
mod routes;

pub use routes::create_router;
