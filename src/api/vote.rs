use mongodb::{
    bson::doc,
    options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument},
    Client as MongoClient,
};
use rocket::{
    futures::TryStreamExt,
    http::Status,
    response::stream::{Event, EventStream},
    serde::json::Json,
    Route, Shutdown, State,
};

use crate::{
    broadcast::{UpdateChannel, VoteUpdate},
    diagnostics::Diagnostics,
    error::{Error, Result},
    model::{
        api::{
            auth::{Admin, AuthToken, Voter},
            candidate::CandidateTally,
            vote::{AuditLogEntry, VoteHistoryEntry, VoteReceipt, VoteSpec},
        },
        db::{
            candidate::Candidate,
            election::Election,
            user::User,
            vote::{NewVote, Vote},
        },
        mongodb::{is_duplicate_key_error, Coll, Id},
    },
};

pub fn routes() -> Vec<Route> {
    routes![
        cast_vote,
        updates,
        get_history,
        get_audit_log,
        get_tallies_admin,
        get_tallies_voter,
        get_tallies_unauthenticated,
    ]
}

/// Cast a ballot.
///
/// The pre-checks give fast, ordered failures, but the unique index on
/// (voter_id, election_id) is what actually guarantees one ballot per voter:
/// a concurrent duplicate that races past the pre-check fails the insert
/// inside the transaction and observes the same error as the fast path.
/// The vote insert and the tally increment commit or abort together, so no
/// partial state is ever visible. First writer wins.
#[post("/votes", data = "<spec>", format = "json")]
pub async fn cast_vote(
    token: AuthToken<Voter>,
    spec: Json<VoteSpec>,
    client: &State<MongoClient>,
    db: &State<mongodb::Database>,
    elections: Coll<Election>,
    votes: Coll<Vote>,
    channel: &State<UpdateChannel>,
    diagnostics: &State<Diagnostics>,
) -> Result<Json<VoteReceipt>> {
    let spec = spec.into_inner();

    let election = elections
        .find_one(spec.election_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found("Election"))?;
    if !election.accepting_votes() {
        return Err(Error::Status(
            Status::BadRequest,
            "Election is not active".to_string(),
        ));
    }

    let by_voter_and_election = doc! {
        "voter_id": *token.id,
        "election_id": *spec.election_id,
    };
    if votes.find_one(by_voter_and_election, None).await?.is_some() {
        return Err(Error::already_voted());
    }

    let vote = NewVote::new(token.id, spec.election_id, spec.candidate_id);

    let mut session = client.start_session(None).await?;
    session.start_transaction(None).await?;

    if let Err(e) = Coll::<NewVote>::from_db(db)
        .insert_one_with_session(&vote, None, &mut session)
        .await
    {
        session.abort_transaction().await?;
        if is_duplicate_key_error(&e) {
            return Err(Error::already_voted());
        }
        return Err(e.into());
    }

    let increment = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();
    let candidate = Coll::<Candidate>::from_db(db)
        .find_one_and_update_with_session(
            doc! {
                "_id": *spec.candidate_id,
                "election_id": *spec.election_id,
            },
            doc! { "$inc": { "vote_count": 1 } },
            increment,
            &mut session,
        )
        .await;
    let candidate = match candidate {
        Ok(Some(candidate)) => candidate,
        Ok(None) => {
            session.abort_transaction().await?;
            return Err(Error::not_found("Candidate"));
        }
        Err(e) => {
            session.abort_transaction().await?;
            return Err(e.into());
        }
    };

    session.commit_transaction().await?;

    diagnostics.record_vote();
    channel.publish(VoteUpdate {
        election_id: spec.election_id,
        candidate_id: spec.candidate_id,
        new_count: candidate.vote_count,
    });

    Ok(Json(VoteReceipt::from(&vote)))
}

/// Live tally updates as server-sent `voteUpdate` events.
///
/// Subscribers only receive events published after they connect, in publish
/// order; a subscriber that lags behind the channel buffer misses events and
/// should re-query the tally endpoint.
#[get("/votes/updates")]
pub fn updates(channel: &State<UpdateChannel>, mut end: Shutdown) -> EventStream![] {
    use rocket::tokio::sync::broadcast::error::RecvError;

    let mut receiver = channel.subscribe();
    EventStream! {
        loop {
            let update = rocket::tokio::select! {
                update = receiver.recv() => match update {
                    Ok(update) => update,
                    Err(RecvError::Closed) => break,
                    Err(RecvError::Lagged(missed)) => {
                        debug!("SSE subscriber lagged, {missed} updates dropped");
                        continue;
                    }
                },
                _ = &mut end => break,
            };
            yield Event::json(&update).event("voteUpdate");
        }
    }
}

/// The caller's own voting history. Voters may see their own choices.
#[get("/votes/history")]
pub async fn get_history(
    token: AuthToken<Voter>,
    votes: Coll<Vote>,
    elections: Coll<Election>,
    candidates: Coll<Candidate>,
) -> Result<Json<Vec<VoteHistoryEntry>>> {
    let newest_first = FindOptions::builder().sort(doc! { "cast_at": -1 }).build();
    let own_votes: Vec<Vote> = votes
        .find(doc! { "voter_id": *token.id }, newest_first)
        .await?
        .try_collect()
        .await?;

    let mut history = Vec::with_capacity(own_votes.len());
    for vote in own_votes {
        let election = elections.find_one(vote.election_id.as_doc(), None).await?;
        let candidate = candidates
            .find_one(vote.candidate_id.as_doc(), None)
            .await?;
        history.push(VoteHistoryEntry {
            election_id: vote.election_id,
            election_title: election.map(|e| e.election.title),
            candidate_name: candidate.as_ref().map(|c| c.name.clone()),
            candidate_party: candidate.and_then(|c| c.candidate.party),
            cast_at: vote.cast_at,
        });
    }
    Ok(Json(history))
}

/// The full audit log, admin only, newest first.
///
/// Entries say who voted in which election and when. The candidate is
/// omitted from the projection entirely so ballot secrecy survives even a
/// serialisation mistake downstream.
#[get("/votes")]
pub async fn get_audit_log(
    _token: AuthToken<Admin>,
    votes: Coll<Vote>,
    users: Coll<User>,
    elections: Coll<Election>,
) -> Result<Json<Vec<AuditLogEntry>>> {
    let newest_first = FindOptions::builder().sort(doc! { "cast_at": -1 }).build();
    let all_votes: Vec<Vote> = votes.find(None, newest_first).await?.try_collect().await?;

    let mut log = Vec::with_capacity(all_votes.len());
    for vote in all_votes {
        let voter = users.find_one(vote.voter_id.as_doc(), None).await?;
        let election = elections.find_one(vote.election_id.as_doc(), None).await?;
        log.push(AuditLogEntry {
            election_id: vote.election_id,
            election_title: election.map(|e| e.election.title),
            voter_name: voter.as_ref().map(|v| v.name.clone()),
            voter_email: voter.map(|v| v.user.email),
            cast_at: vote.cast_at,
        });
    }
    Ok(Json(log))
}

#[get("/elections/<election_id>/tallies", rank = 1)]
pub async fn get_tallies_admin(
    _token: AuthToken<Admin>,
    election_id: Id,
    elections: Coll<Election>,
    candidates: Coll<Candidate>,
) -> Result<Json<Vec<CandidateTally>>> {
    tallies(election_id, elections, candidates).await
}

/// Voters only see detailed tallies of elections they have voted in.
#[get("/elections/<election_id>/tallies", rank = 2)]
pub async fn get_tallies_voter(
    token: AuthToken<Voter>,
    election_id: Id,
    elections: Coll<Election>,
    candidates: Coll<Candidate>,
    votes: Coll<Vote>,
) -> Result<Json<Vec<CandidateTally>>> {
    let own_vote = doc! {
        "voter_id": *token.id,
        "election_id": *election_id,
    };
    if votes.find_one(own_vote, None).await?.is_none() {
        return Err(Error::Status(
            Status::Forbidden,
            "Tallies are only visible once you have voted in this election".to_string(),
        ));
    }
    tallies(election_id, elections, candidates).await
}

#[get("/elections/<_election_id>/tallies", rank = 3)]
pub fn get_tallies_unauthenticated(_election_id: Id) -> Error {
    Error::Status(Status::Unauthorized, "Not logged in".to_string())
}

async fn tallies(
    election_id: Id,
    elections: Coll<Election>,
    candidates: Coll<Candidate>,
) -> Result<Json<Vec<CandidateTally>>> {
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
    Ok(Json(candidates.into_iter().map(CandidateTally::from).collect()))
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
        serde::json::serde_json::json,
    };

    use crate::model::db::{
        candidate::{CandidateCore, NewCandidate},
        election::{ElectionCore, NewElection},
        user::{NewUser, UserCore, DEFAULT_ADMIN_EMAIL, DEFAULT_ADMIN_PASSWORD},
    };

    use super::*;

    /// Insert an active election with one candidate, returning both IDs.
    async fn setup_election(db: &mongodb::Database) -> (Id, Id) {
        let election_id: Id = Coll::<NewElection>::from_db(db)
            .insert_one(ElectionCore::example_active(), None)
            .await
            .unwrap()
            .inserted_id
            .as_object_id()
            .unwrap()
            .into();
        let candidate_id: Id = Coll::<NewCandidate>::from_db(db)
            .insert_one(CandidateCore::example(election_id), None)
            .await
            .unwrap()
            .inserted_id
            .as_object_id()
            .unwrap()
            .into();
        (election_id, candidate_id)
    }

    async fn cast(client: &Client, election_id: Id, candidate_id: Id) -> Status {
        client
            .post(uri!(cast_vote))
            .header(ContentType::JSON)
            .body(
                json!({
                    "electionId": election_id.to_hex(),
                    "candidateId": candidate_id.to_hex(),
                })
                .to_string(),
            )
            .dispatch()
            .await
            .status()
    }

    async fn login(client: &Client, email: &str, password: &str) {
        let response = client
            .post("/auth/login")
            .header(ContentType::JSON)
            .body(json!({ "email": email, "password": password }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
    }

    async fn tally_of(candidates: &Coll<Candidate>, candidate_id: Id) -> u64 {
        candidates
            .find_one(candidate_id.as_doc(), None)
            .await
            .unwrap()
            .unwrap()
            .vote_count
    }

    #[backend_test(voter)]
    async fn vote_increments_tally_exactly_once(
        client: Client,
        db: mongodb::Database,
        votes: Coll<Vote>,
        candidates: Coll<Candidate>,
    ) {
        let (election_id, candidate_id) = setup_election(&db).await;

        let mut subscriber = client
            .rocket()
            .state::<UpdateChannel>()
            .unwrap()
            .subscribe();

        assert_eq!(Status::Ok, cast(&client, election_id, candidate_id).await);
        assert_eq!(1, tally_of(&candidates, candidate_id).await);

        // The committed vote was broadcast with the fresh count.
        let update = subscriber.recv().await.unwrap();
        assert_eq!(update.election_id, election_id);
        assert_eq!(update.candidate_id, candidate_id);
        assert_eq!(update.new_count, 1);

        // Re-submission is rejected and the tally does not move.
        let response = client
            .post(uri!(cast_vote))
            .header(ContentType::JSON)
            .body(
                json!({
                    "electionId": election_id.to_hex(),
                    "candidateId": candidate_id.to_hex(),
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
        let body: rocket::serde::json::Value = response.into_json().await.unwrap();
        assert_eq!(
            body.get("message").unwrap(),
            "You have already voted in this election"
        );
        assert_eq!(1, tally_of(&candidates, candidate_id).await);
        assert_eq!(
            1,
            votes
                .count_documents(doc! { "election_id": *election_id }, None)
                .await
                .unwrap()
        );
    }

    #[backend_test(voter)]
    async fn concurrent_duplicate_casts_single_winner(
        client: Client,
        db: mongodb::Database,
        votes: Coll<Vote>,
        candidates: Coll<Candidate>,
    ) {
        let (election_id, candidate_id) = setup_election(&db).await;

        let body = json!({
            "electionId": election_id.to_hex(),
            "candidateId": candidate_id.to_hex(),
        })
        .to_string();
        let first = client
            .post(uri!(cast_vote))
            .header(ContentType::JSON)
            .body(&body)
            .dispatch();
        let second = client
            .post(uri!(cast_vote))
            .header(ContentType::JSON)
            .body(&body)
            .dispatch();
        let (first, second) = rocket::tokio::join!(first, second);

        let statuses = [first.status(), second.status()];
        assert!(statuses.contains(&Status::Ok));
        assert!(statuses.contains(&Status::BadRequest));

        // Exactly one vote and one increment, whichever writer won.
        assert_eq!(1, tally_of(&candidates, candidate_id).await);
        assert_eq!(
            1,
            votes
                .count_documents(doc! { "election_id": *election_id }, None)
                .await
                .unwrap()
        );
    }

    #[backend_test(voter)]
    async fn unique_index_rejects_duplicate_insert(db: mongodb::Database) {
        let (election_id, candidate_id) = setup_election(&db).await;
        let voter_id = Id::new();

        let new_votes = Coll::<NewVote>::from_db(&db);
        new_votes
            .insert_one(NewVote::new(voter_id, election_id, candidate_id), None)
            .await
            .unwrap();
        let err = new_votes
            .insert_one(NewVote::new(voter_id, election_id, candidate_id), None)
            .await
            .unwrap_err();
        assert!(is_duplicate_key_error(&err));
    }

    #[backend_test(voter)]
    async fn distinct_voters_all_counted(
        client: Client,
        db: mongodb::Database,
        new_users: Coll<NewUser>,
        candidates: Coll<Candidate>,
    ) {
        let (election_id, candidate_id) = setup_election(&db).await;
        let candidate2_id: Id = Coll::<NewCandidate>::from_db(&db)
            .insert_one(CandidateCore::example2(election_id), None)
            .await
            .unwrap()
            .inserted_id
            .as_object_id()
            .unwrap()
            .into();

        // The logged-in voter votes for the first candidate.
        assert_eq!(Status::Ok, cast(&client, election_id, candidate_id).await);

        // A second voter votes for the second candidate.
        new_users
            .insert_one(UserCore::example_voter2(), None)
            .await
            .unwrap();
        login(&client, "victor@example.com", "hunter2hunter2").await;
        assert_eq!(Status::Ok, cast(&client, election_id, candidate2_id).await);

        assert_eq!(1, tally_of(&candidates, candidate_id).await);
        assert_eq!(1, tally_of(&candidates, candidate2_id).await);
    }

    #[backend_test(voter)]
    async fn inactive_elections_reject_votes(
        client: Client,
        db: mongodb::Database,
        candidates: Coll<Candidate>,
    ) {
        for election in [
            ElectionCore::example_inactive(),
            // Completed, with timestamps inside the voting window: the
            // state must win over the timestamps.
            ElectionCore::example_completed_within_window(),
        ] {
            let election_id: Id = Coll::<NewElection>::from_db(&db)
                .insert_one(election, None)
                .await
                .unwrap()
                .inserted_id
                .as_object_id()
                .unwrap()
                .into();
            let candidate_id: Id = Coll::<NewCandidate>::from_db(&db)
                .insert_one(CandidateCore::example(election_id), None)
                .await
                .unwrap()
                .inserted_id
                .as_object_id()
                .unwrap()
                .into();

            let response = client
                .post(uri!(cast_vote))
                .header(ContentType::JSON)
                .body(
                    json!({
                        "electionId": election_id.to_hex(),
                        "candidateId": candidate_id.to_hex(),
                    })
                    .to_string(),
                )
                .dispatch()
                .await;
            assert_eq!(Status::BadRequest, response.status());
            let body: rocket::serde::json::Value = response.into_json().await.unwrap();
            assert_eq!(body.get("message").unwrap(), "Election is not active");
            assert_eq!(0, tally_of(&candidates, candidate_id).await);
        }
    }

    #[backend_test(voter)]
    async fn unknown_candidate_leaves_no_trace(
        client: Client,
        db: mongodb::Database,
        votes: Coll<Vote>,
    ) {
        let (election_id, _) = setup_election(&db).await;

        // A candidate from a different election must not be votable here.
        assert_eq!(
            Status::NotFound,
            cast(&client, election_id, Id::new()).await
        );
        // The transaction aborted: no vote was recorded either.
        assert_eq!(
            0,
            votes
                .count_documents(doc! { "election_id": *election_id }, None)
                .await
                .unwrap()
        );
    }

    #[backend_test(voter)]
    async fn history_shows_own_choice(client: Client, db: mongodb::Database) {
        let (election_id, candidate_id) = setup_election(&db).await;
        assert_eq!(Status::Ok, cast(&client, election_id, candidate_id).await);

        let body: rocket::serde::json::Value = client
            .get(uri!(get_history))
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        let history = body.as_array().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].get("candidateName").unwrap(), "Alice Appleton");
    }

    #[backend_test(voter)]
    async fn audit_log_never_names_candidates(client: Client, db: mongodb::Database) {
        let (election_id, candidate_id) = setup_election(&db).await;
        assert_eq!(Status::Ok, cast(&client, election_id, candidate_id).await);

        // Admins may read the log; the voter from above may not.
        let response = client.get(uri!(get_audit_log)).dispatch().await;
        assert_eq!(Status::NotFound, response.status());

        login(&client, DEFAULT_ADMIN_EMAIL, DEFAULT_ADMIN_PASSWORD).await;
        let body: rocket::serde::json::Value = client
            .get(uri!(get_audit_log))
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        let log = body.as_array().unwrap();
        assert_eq!(log.len(), 1);
        let entry = log[0].as_object().unwrap();
        assert_eq!(entry.get("voterEmail").unwrap(), "vera@example.com");
        // No candidate reference in any form.
        assert!(!entry.keys().any(|key| key.to_lowercase().contains("candidate")));
    }

    #[backend_test(voter)]
    async fn tallies_gated_until_voted(client: Client, db: mongodb::Database) {
        let (election_id, candidate_id) = setup_election(&db).await;

        let response = client
            .get(uri!(get_tallies_voter(election_id)))
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());

        assert_eq!(Status::Ok, cast(&client, election_id, candidate_id).await);

        let body: rocket::serde::json::Value = client
            .get(uri!(get_tallies_voter(election_id)))
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        let tallies = body.as_array().unwrap();
        assert_eq!(tallies.len(), 1);
        assert_eq!(tallies[0].get("voteCount").unwrap(), 1);
    }
}
