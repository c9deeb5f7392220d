use chrono::Utc;
use mongodb::Database;
use rocket::serde::json::Json;
use rocket::State;

use crate::config::Config;
use crate::data::user::db::problem as user_problem;
use crate::data::user::db::UserDbExt;
use crate::data::user::{
    next_password_version, ChangePasswordData, LoginData, LoginResponse, PasswordChanged,
    PasswordHash, UserStatus,
};
use crate::resp::jwt::{lifetime_text, AuthToken, AuthUser};
use crate::resp::problem::{problems, Problem};
use crate::security::Security;

/// Runs bcrypt work on the blocking pool so it doesn't stall request handling.
async fn off_executor<T, F>(work: F) -> Result<T, Problem>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    rocket::tokio::task::spawn_blocking(work).await.map_err(|e| {
        tracing::error!("password hashing task failed: {}", e);
        problems::server_error("Internal server error while checking credentials.")
    })
}

async fn password_matches(hash: &PasswordHash, password: &str) -> Result<bool, Problem> {
    let hash = hash.clone();
    let password = password.to_string();
    off_executor(move || hash.verify(password)).await
}

#[utoipa::path(
    context_path = "/auth",
    request_body = LoginData,
    responses(
        (status = 200, description = "Signed in", body = LoginResponse),
        (status = 401, description = "Wrong password", body = Problem),
        (status = 403, description = "Account isn't active", body = Problem),
        (status = 404, description = "Unknown username", body = Problem),
    )
)]
#[post("/login", data = "<login>")]
#[tracing::instrument(skip(security))]
pub async fn login(
    login: Json<LoginData>,
    db: &State<Database>,
    config: &State<Config>,
    security: &State<Security>,
) -> Result<Json<LoginResponse>, Problem> {
    let user = db
        .find_user_by_username(&login.username)
        .await?
        .ok_or_else(user_problem::not_found)?;

    if !password_matches(&user.password_hash, &login.password).await? {
        tracing::debug!("wrong password for {}", user.username);
        return Err(user_problem::bad_password());
    }

    if user.status != UserStatus::Active {
        return Err(user_problem::inactive(user.status));
    }

    db.record_login(user.id).await?;

    let lifetime = config.token_lifetime();
    let token = AuthToken::new(&user, lifetime).encode_jwt(&security.jwt_secret)?;
    tracing::info!("user {} signed in", user.username);

    Ok(Json(LoginResponse {
        token,
        expires_in: lifetime_text(lifetime),
    }))
}

#[utoipa::path(
    context_path = "/auth",
    request_body = ChangePasswordData,
    responses(
        (status = 200, description = "Password changed, earlier tokens revoked", body = PasswordChanged),
        (status = 400, description = "Wrong current password or unusable new one", body = Problem),
        (status = 401, description = "Not signed in", body = Problem),
    ),
    security(("jwt" = []))
)]
#[put("/change-password", data = "<change>")]
#[tracing::instrument(skip(change, security), fields(user = %auth.user.username))]
pub async fn change_password(
    change: Json<ChangePasswordData>,
    auth: AuthUser,
    db: &State<Database>,
    config: &State<Config>,
    security: &State<Security>,
) -> Result<Json<PasswordChanged>, Problem> {
    let mut user = auth.user;

    if !password_matches(&user.password_hash, &change.current_password).await? {
        return Err(user_problem::wrong_current_password());
    }
    change.validate()?;

    let (new_password, cost) = (change.new_password.clone(), config.bcrypt_cost);
    let hash = off_executor(move || PasswordHash::new(new_password, cost)).await?;
    let version = next_password_version(user.password_version, Utc::now().timestamp_millis());

    if !db.update_password(user.id, &hash, version).await? {
        return Err(user_problem::not_found());
    }
    user.password_hash = hash;
    user.password_version = version;

    let lifetime = config.token_lifetime();
    let token = AuthToken::new(&user, lifetime).encode_jwt(&security.jwt_secret)?;
    tracing::info!("password changed, version now {}", version);

    Ok(Json(PasswordChanged {
        message: "Password changed successfully.".to_string(),
        token,
        expires_in: lifetime_text(lifetime),
    }))
}

#[cfg(test)]
mod auth_endpoints {
    use mongodb::Database;
    use rocket::http::{ContentType, Header, Status};
    use rocket::local::asynchronous::Client;

    use crate::data::user::db::UserDbExt;
    use crate::data::user::{PasswordHash, User, UserStatus};
    use crate::resp::jwt::AUTH_HEADER_NAME;
    use crate::role::Role;

    async fn client() -> Client {
        Client::tracked(crate::create(None).await.expect("backend should start"))
            .await
            .expect("invalid backend")
    }

    async fn insert_user(db: &Database, username: &str, password: &str, status: UserStatus) -> User {
        let user = User {
            id: bson::oid::ObjectId::new(),
            username: username.to_string(),
            email: format!("{}@example.com", username),
            password_hash: PasswordHash::new(password, 4),
            password_version: 1,
            role: Role::Admin,
            associated_id: None,
            associated_collection: None,
            status,
            last_login: None,
        };
        db.users().insert_one(&user, None).await.expect("insert user");
        user
    }

    fn login_body(username: &str, password: &str) -> String {
        serde_json::json!({ "username": username, "password": password }).to_string()
    }

    #[rocket::async_test]
    #[ignore = "requires a running MongoDB instance"]
    async fn login_checks_username_password_and_status() {
        let client = client().await;
        let db: &Database = client.rocket().state().unwrap();
        let active = insert_user(db, "login_active_user", "first-password", UserStatus::Active).await;
        let suspended =
            insert_user(db, "login_suspended_user", "first-password", UserStatus::Suspended).await;

        let unknown = client
            .post("/api/auth/login")
            .header(ContentType::JSON)
            .body(login_body("no_such_user_anywhere", "whatever"))
            .dispatch()
            .await;
        assert_eq!(unknown.status(), Status::NotFound);

        let wrong = client
            .post("/api/auth/login")
            .header(ContentType::JSON)
            .body(login_body(&active.username, "second-password"))
            .dispatch()
            .await;
        assert_eq!(wrong.status(), Status::Unauthorized);

        let blocked = client
            .post("/api/auth/login")
            .header(ContentType::JSON)
            .body(login_body(&suspended.username, "first-password"))
            .dispatch()
            .await;
        assert_eq!(blocked.status(), Status::Forbidden);

        let ok = client
            .post("/api/auth/login")
            .header(ContentType::JSON)
            .body(login_body(&active.username, "first-password"))
            .dispatch()
            .await;
        assert_eq!(ok.status(), Status::Ok);
        let body: serde_json::Value = ok.into_json().await.expect("json body");
        assert!(body["token"].as_str().is_some());
        assert_eq!(body["expiresIn"], "2d");

        db.users().delete_many(bson::doc! { "_id": { "$in": [active.id, suspended.id] } }, None)
            .await
            .unwrap();
    }

    #[rocket::async_test]
    #[ignore = "requires a running MongoDB instance"]
    async fn changing_password_revokes_old_tokens() {
        let client = client().await;
        let db: &Database = client.rocket().state().unwrap();
        let user = insert_user(db, "password_change_user", "first-password", UserStatus::Active).await;

        let login = client
            .post("/api/auth/login")
            .header(ContentType::JSON)
            .body(login_body(&user.username, "first-password"))
            .dispatch()
            .await;
        let body: serde_json::Value = login.into_json().await.unwrap();
        let old_token = body["token"].as_str().unwrap().to_string();

        let changed = client
            .put("/api/auth/change-password")
            .header(ContentType::JSON)
            .header(Header::new(AUTH_HEADER_NAME, format!("Bearer {}", old_token)))
            .body(
                serde_json::json!({
                    "currentPassword": "first-password",
                    "newPassword": "second-password",
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(changed.status(), Status::Ok);
        let body: serde_json::Value = changed.into_json().await.unwrap();
        let new_token = body["token"].as_str().unwrap().to_string();

        let stale = client
            .get("/api/students/details")
            .header(Header::new(AUTH_HEADER_NAME, format!("Bearer {}", old_token)))
            .dispatch()
            .await;
        assert_eq!(stale.status(), Status::Unauthorized);
        let body: serde_json::Value = stale.into_json().await.unwrap();
        assert_eq!(body["title"], "Password has been changed, please log in again.");

        // Admin accounts aren't bound to a student, so a fresh token gets past
        // authentication and stops at the student check.
        let fresh = client
            .get("/api/students/details")
            .header(Header::new(AUTH_HEADER_NAME, format!("Bearer {}", new_token)))
            .dispatch()
            .await;
        assert_eq!(fresh.status(), Status::Forbidden);
        let body: serde_json::Value = fresh.into_json().await.unwrap();
        assert_eq!(body["detail"], "Not a valid student user or association missing.");

        db.users().delete_one(bson::doc! { "_id": user.id }, None).await.unwrap();
    }
}
