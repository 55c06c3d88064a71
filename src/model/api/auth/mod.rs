mod request;
mod token;
mod user;

pub use request::{
    DeleteMeRequest, ForgotPasswordRequest, LoginRequest, RegisterRequest, ResendRequest,
    ResetPasswordRequest, VerifyRequest,
};
pub use token::{auth_cookie, AuthToken, AUTH_TOKEN_COOKIE};
pub use user::{Admin, Rights, User, Voter};
