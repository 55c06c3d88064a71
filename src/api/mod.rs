mod auth;
mod candidate;
mod election;
mod health;
mod user;
mod vote;

use rocket::Route;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.append(&mut auth::routes());
    routes.append(&mut user::routes());
    routes.append(&mut election::routes());
    routes.append(&mut candidate::routes());
    routes.append(&mut vote::routes());
    routes.append(&mut health::routes());
    routes
}
