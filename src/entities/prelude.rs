pub use super::files::Entity as Files;
pub use super::messages::Entity as Messages;
pub use super::urls::Entity as Urls;
pub use super::users::Entity as Users;
