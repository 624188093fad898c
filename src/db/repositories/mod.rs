pub mod file;
pub mod message;
pub mod url;
pub mod user;
