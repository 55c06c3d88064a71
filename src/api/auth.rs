use mongodb::bson::{doc, to_bson};
use rocket::{
    http::{Cookie, CookieJar, Status},
    serde::json::Json,
    Route, State,
};

use crate::{
    diagnostics::Diagnostics,
    error::{Error, Result},
    mailer::Mailer,
    model::{
        api::{
            auth::{
                auth_cookie, Admin, AuthToken, ForgotPasswordRequest, LoginRequest,
                RegisterRequest, ResendRequest, ResetPasswordRequest, VerifyRequest, Voter,
                AUTH_TOKEN_COOKIE,
            },
            user::UserDescription,
        },
        common::Role,
        db::user::{
            hash_password, normalise_email, NewUser, ResetToken, User, MIN_PASSWORD_LENGTH,
        },
        mongodb::Coll,
        otp::Otp,
    },
    Config,
};

pub fn routes() -> Vec<Route> {
    routes![
        register,
        verify,
        resend,
        login,
        logout,
        forgot_password,
        reset_password,
        get_me_admin,
        get_me_voter,
        get_me_unauthenticated,
    ]
}

#[post("/auth/register", data = "<request>", format = "json")]
pub async fn register(
    request: Json<RegisterRequest>,
    users: Coll<User>,
    new_users: Coll<NewUser>,
    config: &State<Config>,
    mailer: &State<Mailer>,
    diagnostics: &State<Diagnostics>,
) -> Result<()> {
    let request = request.into_inner();
    validate_name(&request.name)?;
    validate_password(&request.password)?;
    let email = normalise_email(&request.email);
    if !email.contains('@') {
        return Err(Error::Status(
            Status::BadRequest,
            "A valid email address is required".to_string(),
        ));
    }

    let otp = Otp::issue(config);
    let existing = users.find_one(doc! { "email": &email }, None).await?;
    match existing {
        Some(user) if user.verified => {
            return Err(Error::Status(
                Status::BadRequest,
                "Email already registered".to_string(),
            ));
        }
        Some(user) => {
            // An unverified account is refreshed in place so an abandoned
            // registration never blocks the address.
            let update = doc! {
                "$set": {
                    "name": &request.name,
                    "password_hash": hash_password(&request.password),
                    "otp": to_bson(&otp).expect("OTP serialisation is infallible"),
                }
            };
            users.update_one(user.id.as_doc(), update, None).await?;
        }
        None => {
            let user = NewUser::new(
                request.name,
                &email,
                &request.password,
                Role::Voter,
                Some(otp),
            );
            new_users.insert_one(user, None).await?;
        }
    }

    send_or_record(
        mailer,
        diagnostics,
        &email,
        "Your verification code",
        &format!("Your VoteSecure verification code is {}", otp.code),
    )
    .await
}

#[post("/auth/verify", data = "<request>", format = "json")]
pub async fn verify(
    request: Json<VerifyRequest>,
    cookies: &CookieJar<'_>,
    users: Coll<User>,
    config: &State<Config>,
) -> Result<Json<UserDescription>> {
    let email = normalise_email(&request.email);
    let user = users
        .find_one(doc! { "email": &email }, None)
        .await?
        .ok_or_else(|| Error::not_found("User"))?;

    if user.verified {
        return Err(Error::Status(
            Status::BadRequest,
            "Account is already verified".to_string(),
        ));
    }
    let accepted = user
        .otp
        .map(|otp| otp.accepts(request.code))
        .unwrap_or(false);
    if !accepted {
        return Err(Error::Status(
            Status::BadRequest,
            "Invalid or expired OTP".to_string(),
        ));
    }

    let update = doc! {
        "$set": { "verified": true },
        "$unset": { "otp": "" },
    };
    users.update_one(user.id.as_doc(), update, None).await?;
    let user = users
        .find_one(user.id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found("User"))?;

    cookies.add(auth_cookie(&user, config));
    Ok(Json(user.into()))
}

#[post("/auth/resend", data = "<request>", format = "json")]
pub async fn resend(
    request: Json<ResendRequest>,
    users: Coll<User>,
    config: &State<Config>,
    mailer: &State<Mailer>,
    diagnostics: &State<Diagnostics>,
) -> Result<()> {
    let email = normalise_email(&request.email);
    let user = users
        .find_one(doc! { "email": &email }, None)
        .await?
        .ok_or_else(|| Error::not_found("User"))?;
    if user.verified {
        return Err(Error::Status(
            Status::BadRequest,
            "Account is already verified".to_string(),
        ));
    }

    let otp = Otp::issue(config);
    let update = doc! {
        "$set": { "otp": to_bson(&otp).expect("OTP serialisation is infallible") },
    };
    users.update_one(user.id.as_doc(), update, None).await?;

    send_or_record(
        mailer,
        diagnostics,
        &email,
        "Your verification code",
        &format!("Your VoteSecure verification code is {}", otp.code),
    )
    .await
}

#[post("/auth/login", data = "<request>", format = "json")]
pub async fn login(
    request: Json<LoginRequest>,
    cookies: &CookieJar<'_>,
    users: Coll<User>,
    config: &State<Config>,
) -> Result<Json<UserDescription>> {
    let email = normalise_email(&request.email);
    let user = users
        .find_one(doc! { "email": &email }, None)
        .await?
        .filter(|user| user.verify_password(&request.password))
        .ok_or_else(|| {
            Error::Status(
                Status::Unauthorized,
                "Invalid email or password".to_string(),
            )
        })?;

    // Admin accounts are seeded pre-verified; everyone else must prove
    // their address before logging in.
    if !user.verified {
        return Err(Error::Status(
            Status::Forbidden,
            "Please verify your email address first".to_string(),
        ));
    }

    cookies.add(auth_cookie(&user, config));
    Ok(Json(user.into()))
}

#[delete("/auth")]
pub fn logout(cookies: &CookieJar) -> Status {
    cookies.remove(Cookie::named(AUTH_TOKEN_COOKIE));
    Status::Ok
}

#[post("/auth/forgot-password", data = "<request>", format = "json")]
pub async fn forgot_password(
    request: Json<ForgotPasswordRequest>,
    users: Coll<User>,
    config: &State<Config>,
    mailer: &State<Mailer>,
    diagnostics: &State<Diagnostics>,
) -> Result<()> {
    let email = normalise_email(&request.email);
    // Respond identically whether or not the account exists, so the endpoint
    // cannot be used to probe for registered addresses.
    if let Some(user) = users.find_one(doc! { "email": &email }, None).await? {
        let (token, record) = ResetToken::issue(config);
        let update = doc! {
            "$set": {
                "reset_token": to_bson(&record).expect("Token serialisation is infallible"),
            },
        };
        users.update_one(user.id.as_doc(), update, None).await?;

        let link = format!("{}/reset-password?token={}", config.hostname(), token);
        send_or_record(
            mailer,
            diagnostics,
            &email,
            "Password reset",
            &format!("Reset your VoteSecure password here: {link}"),
        )
        .await?;
    }
    Ok(())
}

#[post("/auth/reset-password", data = "<request>", format = "json")]
pub async fn reset_password(request: Json<ResetPasswordRequest>, users: Coll<User>) -> Result<()> {
    validate_password(&request.new_password)?;
    let email = normalise_email(&request.email);
    let user = users
        .find_one(doc! { "email": &email }, None)
        .await?
        .filter(|user| {
            user.reset_token
                .as_ref()
                .map(|record| record.accepts(&request.token))
                .unwrap_or(false)
        })
        .ok_or_else(|| {
            Error::Status(
                Status::BadRequest,
                "Invalid or expired reset token".to_string(),
            )
        })?;

    let update = doc! {
        "$set": { "password_hash": hash_password(&request.new_password) },
        "$unset": { "reset_token": "" },
    };
    users.update_one(user.id.as_doc(), update, None).await?;
    Ok(())
}

#[get("/auth/me", rank = 1)]
pub async fn get_me_admin(
    token: AuthToken<Admin>,
    users: Coll<User>,
) -> Result<Json<UserDescription>> {
    describe_me(token.id, users).await
}

#[get("/auth/me", rank = 2)]
pub async fn get_me_voter(
    token: AuthToken<Voter>,
    users: Coll<User>,
) -> Result<Json<UserDescription>> {
    describe_me(token.id, users).await
}

#[get("/auth/me", rank = 3)]
pub fn get_me_unauthenticated() -> Error {
    Error::Status(Status::Unauthorized, "Not logged in".to_string())
}

async fn describe_me(
    id: crate::model::mongodb::Id,
    users: Coll<User>,
) -> Result<Json<UserDescription>> {
    let user = users
        .find_one(id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found("User"))?;
    Ok(Json(user.into()))
}

/// Send an email, recording any failure in diagnostics before failing the
/// request.
async fn send_or_record(
    mailer: &Mailer,
    diagnostics: &Diagnostics,
    to: &str,
    subject: &str,
    message: &str,
) -> Result<()> {
    if let Err(e) = mailer.send(to, subject, message).await {
        diagnostics.record_email_failure(e.to_string());
        warn!("Failed to email {to}: {e}");
        return Err(Error::Status(
            Status::InternalServerError,
            "Failed to send email".to_string(),
        ));
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<()> {
    let valid = !name.trim().is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphabetic() || c.is_whitespace());
    if !valid {
        return Err(Error::Status(
            Status::BadRequest,
            "Name must contain only letters and spaces".to_string(),
        ));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<()> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(Error::Status(
            Status::BadRequest,
            format!("Password must be at least {MIN_PASSWORD_LENGTH} characters"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rocket::{http::ContentType, local::asynchronous::Client, serde::json::serde_json::json};

    use crate::model::db::user::{UserCore, DEFAULT_ADMIN_EMAIL, DEFAULT_ADMIN_PASSWORD};

    use super::*;

    async fn register_example(client: &Client) {
        let response = client
            .post(uri!(register))
            .header(ContentType::JSON)
            .body(
                json!({
                    "name": "Vera Voter",
                    "email": "vera@example.com",
                    "password": "correct-horse-battery",
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
    }

    async fn stored_otp(users: &Coll<User>, email: &str) -> Otp {
        users
            .find_one(doc! { "email": email }, None)
            .await
            .unwrap()
            .unwrap()
            .otp
            .unwrap()
    }

    #[backend_test]
    async fn register_verify_login(client: Client, users: Coll<User>) {
        register_example(&client).await;

        // The account exists but is unverified; login is forbidden.
        let response = client
            .post(uri!(login))
            .header(ContentType::JSON)
            .body(
                json!({ "email": "vera@example.com", "password": "correct-horse-battery" })
                    .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());

        // Verify with the emailed code (read from the database under test).
        let otp = stored_otp(&users, "vera@example.com").await;
        let response = client
            .post(uri!(verify))
            .header(ContentType::JSON)
            .body(
                json!({ "email": "vera@example.com", "code": otp.code.to_string() }).to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        assert!(client.cookies().get(AUTH_TOKEN_COOKIE).is_some());

        let user = users
            .find_one(doc! { "email": "vera@example.com" }, None)
            .await
            .unwrap()
            .unwrap();
        assert!(user.verified);
        assert!(user.otp.is_none());

        // Login now succeeds.
        client.delete(uri!(logout)).dispatch().await;
        let response = client
            .post(uri!(login))
            .header(ContentType::JSON)
            .body(
                json!({ "email": "vera@example.com", "password": "correct-horse-battery" })
                    .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        assert!(client.cookies().get(AUTH_TOKEN_COOKIE).is_some());
    }

    #[backend_test]
    async fn wrong_otp_rejected(client: Client, users: Coll<User>) {
        register_example(&client).await;
        let otp = stored_otp(&users, "vera@example.com").await;

        // Derive a code guaranteed to differ from the real one.
        let mut wrong = otp.code.to_string().into_bytes();
        wrong[0] = if wrong[0] == b'9' { b'0' } else { wrong[0] + 1 };
        let wrong = String::from_utf8(wrong).unwrap();

        let response = client
            .post(uri!(verify))
            .header(ContentType::JSON)
            .body(json!({ "email": "vera@example.com", "code": wrong }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
        assert_eq!(None, client.cookies().get(AUTH_TOKEN_COOKIE));
    }

    #[backend_test]
    async fn verified_email_cannot_reregister(client: Client, users: Coll<NewUser>) {
        users.insert_one(UserCore::example_voter(), None).await.unwrap();

        let response = client
            .post(uri!(register))
            .header(ContentType::JSON)
            .body(
                json!({
                    "name": "Impostor",
                    "email": "vera@example.com",
                    "password": "irrelevant-pass",
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
    }

    #[backend_test]
    async fn invalid_registrations_rejected(client: Client) {
        // Numbers in the name.
        let response = client
            .post(uri!(register))
            .header(ContentType::JSON)
            .body(
                json!({ "name": "R2D2", "email": "r2@example.com", "password": "longenough" })
                    .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());

        // Short password.
        let response = client
            .post(uri!(register))
            .header(ContentType::JSON)
            .body(
                json!({ "name": "Short Pass", "email": "short@example.com", "password": "short" })
                    .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
    }

    #[backend_test]
    async fn admin_login(client: Client) {
        let response = client
            .post(uri!(login))
            .header(ContentType::JSON)
            .body(
                json!({ "email": DEFAULT_ADMIN_EMAIL, "password": DEFAULT_ADMIN_PASSWORD })
                    .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        assert!(client.cookies().get(AUTH_TOKEN_COOKIE).is_some());

        let body: rocket::serde::json::Value = client
            .get(uri!(get_me_voter))
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert_eq!(body.get("role").unwrap(), "admin");
        assert!(body.get("passwordHash").is_none());
    }

    #[backend_test]
    async fn password_reset_round_trip(client: Client, users: Coll<User>) {
        register_example(&client).await;
        let otp = stored_otp(&users, "vera@example.com").await;
        client
            .post(uri!(verify))
            .header(ContentType::JSON)
            .body(
                json!({ "email": "vera@example.com", "code": otp.code.to_string() }).to_string(),
            )
            .dispatch()
            .await;

        let response = client
            .post(uri!(forgot_password))
            .header(ContentType::JSON)
            .body(json!({ "email": "vera@example.com" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        // An unknown address gets the same response.
        let response = client
            .post(uri!(forgot_password))
            .header(ContentType::JSON)
            .body(json!({ "email": "nobody@example.com" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        // The stored record holds a digest; a wrong token fails.
        let response = client
            .post(uri!(reset_password))
            .header(ContentType::JSON)
            .body(
                json!({
                    "email": "vera@example.com",
                    "token": "not-the-token",
                    "newPassword": "a-whole-new-password",
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
    }

    #[backend_test(voter)]
    async fn logout_clears_cookie(client: Client) {
        assert!(client.cookies().get(AUTH_TOKEN_COOKIE).is_some());

        let response = client.delete(uri!(logout)).dispatch().await;

        assert_eq!(Status::Ok, response.status());
        assert_eq!(None, client.cookies().get(AUTH_TOKEN_COOKIE));
    }

    #[backend_test]
    async fn me_requires_login(client: Client) {
        let response = client.get(uri!(get_me_voter)).dispatch().await;
        assert_eq!(Status::Unauthorized, response.status());
    }
}
