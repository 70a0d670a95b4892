//! Service layer - the user store contract and its implementation.

mod listing;
mod user_store;

pub use listing::{stream_users, Page, PageRequest};
pub use user_store::{UserManager, UserStore};
