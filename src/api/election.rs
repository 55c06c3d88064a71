use mongodb::bson::doc;
use mongodb::Client as MongoClient;
use rocket::{futures::TryStreamExt, serde::json::Json, Route, State};

use crate::{
    error::{Error, Result},
    model::{
        api::{
            auth::{Admin, AuthToken},
            election::{ElectionDescription, ElectionSpec, ElectionUpdate},
        },
        common::ElectionState,
        db::{
            candidate::Candidate,
            election::{Election, NewElection},
            vote::Vote,
        },
        mongodb::{Coll, Id},
    },
};

pub fn routes() -> Vec<Route> {
    routes![
        get_elections_admin,
        get_elections,
        get_election,
        create_election,
        update_election,
        delete_election,
    ]
}

/// Admins see every election regardless of state.
#[get("/elections", rank = 1)]
pub async fn get_elections_admin(
    _token: AuthToken<Admin>,
    elections: Coll<Election>,
) -> Result<Json<Vec<ElectionDescription>>> {
    let elections: Vec<Election> = elections.find(None, None).await?.try_collect().await?;
    Ok(Json(
        elections.into_iter().map(ElectionDescription::from).collect(),
    ))
}

/// Everyone else only sees elections that are open for voting.
#[get("/elections", rank = 2)]
pub async fn get_elections(elections: Coll<Election>) -> Result<Json<Vec<ElectionDescription>>> {
    let filter = doc! { "state": ElectionState::Active };
    let elections: Vec<Election> = elections.find(filter, None).await?.try_collect().await?;
    Ok(Json(
        elections.into_iter().map(ElectionDescription::from).collect(),
    ))
}

#[get("/elections/<id>")]
pub async fn get_election(id: Id, elections: Coll<Election>) -> Result<Json<ElectionDescription>> {
    let election = elections
        .find_one(id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found("Election"))?;
    Ok(Json(election.into()))
}

#[post("/elections", data = "<spec>", format = "json")]
pub async fn create_election(
    _token: AuthToken<Admin>,
    spec: Json<ElectionSpec>,
    elections: Coll<Election>,
    new_elections: Coll<NewElection>,
) -> Result<Json<ElectionDescription>> {
    let spec = spec.into_inner();
    validate_window(spec.start_time, spec.end_time)?;

    let election: NewElection = spec.into();
    let new_id: Id = new_elections
        .insert_one(&election, None)
        .await?
        .inserted_id
        .as_object_id()
        .unwrap() // Safe because the ID comes directly from the database.
        .into();
    let election = elections
        .find_one(new_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found("Election"))?;
    Ok(Json(election.into()))
}

#[put("/elections/<id>", data = "<update>", format = "json")]
pub async fn update_election(
    _token: AuthToken<Admin>,
    id: Id,
    update: Json<ElectionUpdate>,
    elections: Coll<Election>,
) -> Result<Json<ElectionDescription>> {
    let update = update.into_inner();
    let mut election = elections
        .find_one(id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found("Election"))?;

    if let Some(title) = update.title {
        election.title = title;
    }
    if let Some(description) = update.description {
        election.description = description;
    }
    if let Some(start_time) = update.start_time {
        election.start_time = start_time;
    }
    if let Some(end_time) = update.end_time {
        election.end_time = end_time;
    }
    if let Some(state) = update.state {
        election.state = state;
    }
    validate_window(election.start_time, election.end_time)?;

    elections
        .replace_one(id.as_doc(), &election, None)
        .await?;
    Ok(Json(election.into()))
}

/// Delete an election along with its candidates and votes.
///
/// All three deletions happen in one transaction so a failure part-way never
/// leaves dangling candidates or votes.
#[delete("/elections/<id>")]
pub async fn delete_election(
    _token: AuthToken<Admin>,
    id: Id,
    client: &State<MongoClient>,
    db: &State<mongodb::Database>,
    elections: Coll<Election>,
) -> Result<()> {
    if elections.find_one(id.as_doc(), None).await?.is_none() {
        return Err(Error::not_found("Election"));
    }

    let mut session = client.start_session(None).await?;
    session.start_transaction(None).await?;

    let result: Result<()> = async {
        let by_election = doc! { "election_id": *id };
        Coll::<Vote>::from_db(db)
            .delete_many_with_session(by_election.clone(), None, &mut session)
            .await?;
        Coll::<Candidate>::from_db(db)
            .delete_many_with_session(by_election, None, &mut session)
            .await?;
        Coll::<Election>::from_db(db)
            .delete_one_with_session(id.as_doc(), None, &mut session)
            .await?;
        Ok(())
    }
    .await;

    match result {
        Ok(()) => {
            session.commit_transaction().await?;
            info!("Deleted election {id} and its candidates and votes");
            Ok(())
        }
        Err(e) => {
            session.abort_transaction().await?;
            Err(e)
        }
    }
}

fn validate_window(
    start: chrono::DateTime<chrono::Utc>,
    end: chrono::DateTime<chrono::Utc>,
) -> Result<()> {
    if end <= start {
        return Err(Error::Status(
            rocket::http::Status::BadRequest,
            "End time must be after start time".to_string(),
        ));
    }
    Ok(())
}
