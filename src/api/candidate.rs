use mongodb::bson::doc;
use rocket::{futures::TryStreamExt, serde::json::Json, Route};

use crate::{
    error::{Error, Result},
    model::{
        api::{
            auth::{Admin, AuthToken},
            candidate::{CandidateDescription, CandidateUpdate, NewCandidateRequest},
        },
        db::{
            candidate::{Candidate, NewCandidate},
            election::Election,
        },
        mongodb::{Coll, Id},
    },
};

pub fn routes() -> Vec<Route> {
    routes![
        get_candidates,
        create_candidate,
        update_candidate,
        delete_candidate,
    ]
}

/// Candidates standing in an election, without tallies. Counts are only
/// served through the tally endpoint, which enforces the visibility policy.
#[get("/elections/<election_id>/candidates")]
pub async fn get_candidates(
    election_id: Id,
    elections: Coll<Election>,
    candidates: Coll<Candidate>,
) -> Result<Json<Vec<CandidateDescription>>> {
    if elections
        .find_one(election_id.as_doc(), None)
        .await?
        .is_none()
    {
        return Err(Error::not_found("Election"));
    }
    let candidates: Vec<Candidate> = candidates
        .find(doc! { "election_id": *election_id }, None)
        .await?
        .try_collect()
        .await?;
    Ok(Json(
        candidates
            .into_iter()
            .map(CandidateDescription::from)
            .collect(),
    ))
}

#[post("/candidates", data = "<request>", format = "json")]
pub async fn create_candidate(
    _token: AuthToken<Admin>,
    request: Json<NewCandidateRequest>,
    elections: Coll<Election>,
    candidates: Coll<Candidate>,
    new_candidates: Coll<NewCandidate>,
) -> Result<Json<CandidateDescription>> {
    let request = request.into_inner();
    if elections
        .find_one(request.election_id.as_doc(), None)
        .await?
        .is_none()
    {
        return Err(Error::not_found("Election"));
    }

    let candidate = NewCandidate::new(request.election_id, request.spec);
    let new_id: Id = new_candidates
        .insert_one(&candidate, None)
        .await?
        .inserted_id
        .as_object_id()
        .unwrap() // Safe because the ID comes directly from the database.
        .into();
    let candidate = candidates
        .find_one(new_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found("Candidate"))?;
    Ok(Json(candidate.into()))
}

/// Rename or re-party a candidate. The tally and election binding are never
/// touched here; the vote count only moves through the voting transaction.
#[put("/candidates/<id>", data = "<update>", format = "json")]
pub async fn update_candidate(
    _token: AuthToken<Admin>,
    id: Id,
    update: Json<CandidateUpdate>,
    candidates: Coll<Candidate>,
) -> Result<Json<CandidateDescription>> {
    let update = update.into_inner();
    let mut set = doc! {};
    if let Some(name) = update.name {
        set.insert("name", name);
    }
    if let Some(party) = update.party {
        set.insert("party", party);
    }
    if !set.is_empty() {
        candidates
            .update_one(id.as_doc(), doc! { "$set": set }, None)
            .await?;
    }
    let candidate = candidates
        .find_one(id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found("Candidate"))?;
    Ok(Json(candidate.into()))
}

/// Remove a candidate. Existing votes are kept: they remain valid history
/// and the audit log never referenced the candidate anyway.
#[delete("/candidates/<id>")]
pub async fn delete_candidate(
    _token: AuthToken<Admin>,
    id: Id,
    candidates: Coll<Candidate>,
) -> Result<()> {
    let result = candidates.delete_one(id.as_doc(), None).await?;
    if result.deleted_count == 0 {
        return Err(Error::not_found("Candidate"));
    }
    Ok(())
}
