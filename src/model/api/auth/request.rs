use serde::Deserialize;

use crate::model::otp::Code;

/// Request to register a new voter account.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Request to log in to an existing, verified account.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request to verify a freshly-registered account with an emailed OTP.
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub email: String,
    pub code: Code,
}

/// Request to re-send the OTP for an unverified account.
#[derive(Debug, Deserialize)]
pub struct ResendRequest {
    pub email: String,
}

/// Request to start a password reset.
#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

/// Request to complete a password reset with an emailed token.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub email: String,
    pub token: String,
    pub new_password: String,
}

/// Request to delete the authenticated account. The credentials are required
/// again as confirmation.
#[derive(Debug, Deserialize)]
pub struct DeleteMeRequest {
    pub email: String,
    pub password: String,
}
