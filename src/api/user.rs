use rocket::{
    futures::TryStreamExt,
    http::{Cookie, CookieJar, Status},
    serde::json::Json,
    Route,
};

use crate::{
    error::{Error, Result},
    model::{
        api::{
            auth::{Admin, AuthToken, DeleteMeRequest, Voter, AUTH_TOKEN_COOKIE},
            user::UserDescription,
        },
        db::user::{normalise_email, User},
        mongodb::{Coll, Id},
    },
};

pub fn routes() -> Vec<Route> {
    routes![get_users, delete_me_admin, delete_me_voter, delete_user]
}

/// List all accounts. Password hashes and outstanding tokens never leave the
/// database; see [`UserDescription`].
#[get("/users")]
pub async fn get_users(
    _token: AuthToken<Admin>,
    users: Coll<User>,
) -> Result<Json<Vec<UserDescription>>> {
    let users: Vec<User> = users.find(None, None).await?.try_collect().await?;
    Ok(Json(users.into_iter().map(UserDescription::from).collect()))
}

#[delete("/users/me", data = "<request>", format = "json", rank = 1)]
pub async fn delete_me_admin(
    token: AuthToken<Admin>,
    request: Json<DeleteMeRequest>,
    cookies: &CookieJar<'_>,
    users: Coll<User>,
) -> Result<()> {
    delete_own_account(token.id, &request, cookies, users).await
}

#[delete("/users/me", data = "<request>", format = "json", rank = 2)]
pub async fn delete_me_voter(
    token: AuthToken<Voter>,
    request: Json<DeleteMeRequest>,
    cookies: &CookieJar<'_>,
    users: Coll<User>,
) -> Result<()> {
    delete_own_account(token.id, &request, cookies, users).await
}

/// Self-deletion re-authenticates with full credentials so a hijacked session
/// alone cannot destroy the account.
async fn delete_own_account(
    id: Id,
    request: &DeleteMeRequest,
    cookies: &CookieJar<'_>,
    users: Coll<User>,
) -> Result<()> {
    let user = users
        .find_one(id.as_doc(), None)
        .await?
        .filter(|user| {
            user.email == normalise_email(&request.email)
                && user.verify_password(&request.password)
        })
        .ok_or_else(|| {
            Error::Status(
                Status::Unauthorized,
                "Invalid email or password".to_string(),
            )
        })?;

    users.delete_one(user.id.as_doc(), None).await?;
    cookies.remove(Cookie::named(AUTH_TOKEN_COOKIE));
    Ok(())
}

#[delete("/users/<id>", rank = 3)]
pub async fn delete_user(token: AuthToken<Admin>, id: Id, users: Coll<User>) -> Result<()> {
    if id == token.id {
        return Err(Error::Status(
            Status::BadRequest,
            "You cannot delete your own account".to_string(),
        ));
    }
    let result = users.delete_one(id.as_doc(), None).await?;
    if result.deleted_count == 0 {
        return Err(Error::not_found("User"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use mongodb::bson::doc;
    use rocket::{http::ContentType, local::asynchronous::Client, serde::json::serde_json::json};

    use crate::model::db::user::{NewUser, UserCore};

    use super::*;

    #[backend_test(admin)]
    async fn list_users_hides_secrets(client: Client, new_users: Coll<NewUser>) {
        new_users
            .insert_one(UserCore::example_voter(), None)
            .await
            .unwrap();

        let response = client.get(uri!(get_users)).dispatch().await;
        assert_eq!(Status::Ok, response.status());

        let body: rocket::serde::json::Value = response.into_json().await.unwrap();
        let listed = body.as_array().unwrap();
        // Default admin plus the inserted voter.
        assert_eq!(listed.len(), 2);
        for user in listed {
            assert!(user.get("passwordHash").is_none());
            assert!(user.get("password_hash").is_none());
            assert!(user.get("otp").is_none());
        }
    }

    #[backend_test(voter)]
    async fn listing_requires_admin(client: Client) {
        let response = client.get(uri!(get_users)).dispatch().await;
        assert_eq!(Status::NotFound, response.status());
    }

    #[backend_test(admin)]
    async fn admin_deletes_other_but_not_self(
        client: Client,
        users: Coll<User>,
        new_users: Coll<NewUser>,
    ) {
        new_users
            .insert_one(UserCore::example_voter(), None)
            .await
            .unwrap();
        let voter = users
            .find_one(doc! { "email": "vera@example.com" }, None)
            .await
            .unwrap()
            .unwrap();
        let admin = users
            .find_one(doc! { "role": "admin" }, None)
            .await
            .unwrap()
            .unwrap();

        // Self-deletion via the admin route is refused.
        let response = client
            .delete(uri!(delete_user(admin.id)))
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());

        let response = client
            .delete(uri!(delete_user(voter.id)))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        assert!(users
            .find_one(voter.id.as_doc(), None)
            .await
            .unwrap()
            .is_none());
    }

    #[backend_test(voter)]
    async fn self_deletion_reauthenticates(client: Client, users: Coll<User>) {
        // Wrong password: account survives.
        let response = client
            .delete(uri!(delete_me_voter))
            .header(ContentType::JSON)
            .body(json!({ "email": "vera@example.com", "password": "wrong" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, response.status());

        let response = client
            .delete(uri!(delete_me_voter))
            .header(ContentType::JSON)
            .body(
                json!({ "email": "vera@example.com", "password": "correct-horse-battery" })
                    .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        assert_eq!(None, client.cookies().get(AUTH_TOKEN_COOKIE));
        assert!(users
            .find_one(doc! { "email": "vera@example.com" }, None)
            .await
            .unwrap()
            .is_none());
    }
}
