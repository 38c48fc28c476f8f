/// Domain records shared by the auth core, the stores and the HTTP layer.

mod token;
mod user;

pub use token::{NewToken, SingleUsePurpose, TokenKind, TokenRecord};
pub use user::{Lifecycle, NewUser, Role, User, UserProfile};
