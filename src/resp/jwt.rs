use bson::oid::ObjectId;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use mongodb::Database;
use rocket::http::Status;
use rocket::outcome::Outcome::{Error as Failure, Forward, Success};
use rocket::request::{self, FromRequest, Request};
use serde::{Deserialize, Serialize};

use crate::data::user::db::UserDbExt;
use crate::data::user::User;
use crate::resp::problem::{problems, Problem};
use crate::security::Security;

pub static AUTH_HEADER_NAME: &str = "Authorization";
static BEARER_PREFIX: &str = "Bearer ";

/// Claims of a user auth token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthToken {
    #[serde(with = "jwt_numeric_date")]
    iat: DateTime<Utc>,
    #[serde(with = "jwt_numeric_date")]
    exp: DateTime<Utc>,
    pub id: String,
    pub username: String,
    pub password_version: i64,
}

impl AuthToken {
    pub fn new(user: &User, lifetime: Duration) -> AuthToken {
        let now = Utc::now();
        AuthToken {
            iat: now,
            exp: now + lifetime,
            id: user.id.to_hex(),
            username: user.username.clone(),
            password_version: user.password_version,
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.exp
    }

    pub fn encode_jwt(&self, secret: impl AsRef<[u8]>) -> Result<String, jsonwebtoken::errors::Error> {
        let header = Header::new(Algorithm::HS256);
        encode(&header, &self, &EncodingKey::from_secret(secret.as_ref()))
    }

    pub fn decode_jwt(
        token: &str,
        secret: impl AsRef<[u8]>,
    ) -> Result<AuthToken, jsonwebtoken::errors::Error> {
        decode::<AuthToken>(
            token,
            &DecodingKey::from_secret(secret.as_ref()),
            &Validation::new(Algorithm::HS256),
        )
        .map(|data| data.claims)
    }

    pub fn user_id(&self) -> Option<ObjectId> {
        ObjectId::parse_str(&self.id).ok()
    }

    /// Whether the token was issued for the user's current password.
    pub fn is_current_for(&self, user: &User) -> bool {
        self.id == user.id.to_hex() && self.password_version == user.password_version
    }
}

/// Token lifetime the way clients are told about it: `"2d"`, or `"36h"`.
pub fn lifetime_text(lifetime: Duration) -> String {
    let hours = lifetime.num_hours();
    if hours > 0 && hours % 24 == 0 {
        format!("{}d", hours / 24)
    } else {
        format!("{}h", hours)
    }
}

pub fn auth_problem(status: Status, title: impl ToString) -> Problem {
    Problem::new_untyped(status, title)
}

/// Problem raised by an auth guard, kept for the catcher that answers the request.
#[derive(Debug, Default)]
pub struct GuardProblem(pub Option<Problem>);

impl GuardProblem {
    pub fn of<'a>(req: &'a Request<'_>) -> Option<&'a Problem> {
        req.local_cache(GuardProblem::default).0.as_ref()
    }
}

fn reject<T>(req: &Request<'_>, problem: Problem) -> request::Outcome<T, Problem> {
    let status = problem.status;
    req.local_cache(|| GuardProblem(Some(problem.clone())));
    Failure((status, problem))
}

pub fn extract_bearer(header: Option<&str>) -> Option<&str> {
    header
        .and_then(|it| it.strip_prefix(BEARER_PREFIX))
        .map(str::trim)
        .filter(|it| !it.is_empty())
}

/// An authenticated user whose token matches their current password version.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    pub token: AuthToken,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthUser {
    type Error = Problem;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let (security, db) = match (
            req.rocket().state::<Security>(),
            req.rocket().state::<Database>(),
        ) {
            (Some(security), Some(db)) => (security, db),
            _ => {
                tracing::error!("auth guard used without managed Security/Database state");
                let problem = problems::server_error("Internal server error during authentication.");
                return reject(req, problem);
            }
        };

        let token = match extract_bearer(req.headers().get_one(AUTH_HEADER_NAME)) {
            Some(it) => it,
            None => {
                tracing::debug!("request without bearer token");
                let problem = auth_problem(Status::Unauthorized, "No token provided");
                return reject(req, problem);
            }
        };

        let claims = match AuthToken::decode_jwt(token, &security.jwt_secret) {
            Ok(it) => it,
            Err(e) => {
                tracing::debug!("rejected auth token: {}", e);
                let problem = Problem::from(e);
                return reject(req, problem);
            }
        };

        let user_id = match claims.user_id() {
            Some(it) => it,
            None => {
                let problem = auth_problem(Status::Forbidden, "Invalid Token");
                return reject(req, problem);
            }
        };

        let user = match db.get_user(user_id).await {
            Ok(Some(it)) => it,
            Ok(None) => {
                let problem = auth_problem(Status::Unauthorized, "User not found");
                return reject(req, problem);
            }
            Err(e) => {
                tracing::error!("database error during token verification: {}", e);
                let problem = problems::server_error("Internal server error during authentication.");
                return reject(req, problem);
            }
        };

        if !claims.is_current_for(&user) {
            tracing::debug!("stale password version in token for user {}", user.id);
            let problem = auth_problem(
                Status::Unauthorized,
                "Password has been changed, please log in again.",
            );
            return reject(req, problem);
        }

        Success(AuthUser {
            user,
            token: claims,
        })
    }
}

/// An authenticated user bound to a student record.
#[derive(Debug, Clone)]
pub struct StudentAuth {
    pub user: User,
    pub student_id: ObjectId,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for StudentAuth {
    type Error = Problem;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let auth = match req.guard::<AuthUser>().await {
            Success(it) => it,
            Failure(e) => return Failure(e),
            Forward(f) => return Forward(f),
        };

        match auth.user.student_id() {
            Some(student_id) => Success(StudentAuth {
                user: auth.user,
                student_id,
            }),
            None => {
                tracing::debug!("user {} isn't bound to a student", auth.user.id);
                let problem = problems::forbidden(
                    "Not a valid student user or association missing.",
                );
                reject(req, problem)
            }
        }
    }
}

pub mod doc {
    use utoipa::openapi::security::*;

    #[derive(Clone, Copy)]
    pub struct JWTAuth;

    impl From<JWTAuth> for SecurityScheme {
        fn from(_: JWTAuth) -> SecurityScheme {
            let mut http = Http::new(HttpAuthScheme::Bearer);
            http.bearer_format = Some("JWT".to_string());
            SecurityScheme::Http(http)
        }
    }

    impl utoipa::Modify for JWTAuth {
        fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
            if let Some(c) = openapi.components.as_mut() {
                c.add_security_scheme("jwt", *self)
            }
        }
    }
}

mod jwt_numeric_date {
    // Based on: https://github.com/Keats/jsonwebtoken/blob/master/examples/custom_chrono.rs

    //! Custom serialization of DateTime<Utc> to conform to the JWT spec (RFC 7519 section 2, "Numeric Date")
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serializes a DateTime<Utc> to a Unix timestamp (seconds since 1970/1/1T00:00:00T)
    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(date.timestamp())
    }

    /// Attempts to deserialize an i64 and use as a Unix timestamp
    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Utc.timestamp_opt(i64::deserialize(deserializer)?, 0)
            .single() // If there are multiple or no valid DateTimes from timestamp, return None
            .ok_or_else(|| serde::de::Error::custom("Invalid Unix timestamp value."))
    }
}
