pub mod prelude;

pub mod files;
pub mod messages;
pub mod urls;
pub mod users;
