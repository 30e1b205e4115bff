//! User membership lists.

mod groups;
mod userlist;

pub use groups::SpecialGroup;
pub use userlist::{UserList, UserListSnapshot};
