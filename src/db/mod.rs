pub mod connection;
pub mod fixture;
pub mod schema;
pub mod queries;

pub use connection::*;
pub use fixture::Fixture;
pub use schema::*;
pub use queries::*;
