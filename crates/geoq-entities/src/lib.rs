pub mod bytes;
pub mod error;
pub mod message;
pub mod query;
pub mod request;
pub mod status;
pub mod token;
pub mod user;

pub use error::ApiError;
pub use message::QueueMessage;
pub use query::GeoQuery;
pub use request::{Download, Request};
pub use status::RequestStatus;
pub use token::UserToken;
pub use user::{Role, User, Worker};
