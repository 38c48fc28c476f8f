pub mod account;

pub use account::{
    AccountService, LoginInput, LoginOutcome, RegisterInput, ResetPasswordInput,
};
