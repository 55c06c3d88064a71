use jsonwebtoken::errors::{Error as JwtError, ErrorKind as JwtErrorKind};
use mongodb::error::Error as DbError;
use rocket::http::{ContentType, Status};
use rocket::response::Responder;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error("{1}")]
    Status(Status, String),
}

impl Error {
    /// A `404 Not Found` for the described resource.
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::Status(Status::NotFound, format!("{} not found", what))
    }

    /// The rejection every duplicate cast receives, whether caught by the
    /// pre-check or by the unique index.
    pub fn already_voted() -> Self {
        Self::Status(
            Status::BadRequest,
            "You have already voted in this election".to_string(),
        )
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        let status = match &self {
            Self::Status(status, _) => *status,
            Self::Db(_) => Status::InternalServerError,
            Self::Jwt(err) => match err.kind() {
                JwtErrorKind::ExpiredSignature | JwtErrorKind::ImmatureSignature => {
                    Status::Unauthorized
                }
                _ => Status::BadRequest,
            },
        };
        if status.class().is_server_error() {
            error!("{} {} failed: {}", req.method(), req.uri(), self);
        } else {
            debug!("{} {} rejected: {}", req.method(), req.uri(), self);
        }
        // Domain failures carry a user-safe message; infrastructure errors
        // must not leak internal detail.
        let message = match self {
            Self::Status(_, message) => message,
            _ => "Server Error".to_string(),
        };
        let body = rocket::serde::json::json!({ "message": message }).to_string();
        rocket::Response::build()
            .status(status)
            .header(ContentType::JSON)
            .sized_body(body.len(), std::io::Cursor::new(body))
            .ok()
    }
}
