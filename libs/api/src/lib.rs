pub mod device;
pub mod message;
pub mod path;
pub mod request;
pub mod response;
