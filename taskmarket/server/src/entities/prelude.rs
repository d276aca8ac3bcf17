pub use super::chat::Entity as Chat;
pub use super::message::Entity as Message;
pub use super::offer::Entity as Offer;
pub use super::review::Entity as Review;
pub use super::task::Entity as Task;
pub use super::user::Entity as User;
