use bson::doc;
use bson::oid::ObjectId;
use mongodb::{Collection, Database};

use super::{PasswordHash, User, USER_COLLECTION_NAME};

pub mod problem {
    use crate::resp::problem::Problem;
    use rocket::http::Status;

    #[inline]
    pub fn not_found() -> Problem {
        Problem::new_untyped(Status::NotFound, "User not found.")
    }

    #[inline]
    pub fn bad_password() -> Problem {
        Problem::new_untyped(Status::Unauthorized, "Password is Wrong")
    }

    #[inline]
    pub fn inactive(status: impl std::fmt::Debug) -> Problem {
        Problem::new_untyped(Status::Forbidden, "Account isn't active.")
            .detail(format!("Account status is {:?}.", status))
            .clone()
    }

    #[inline]
    pub fn wrong_current_password() -> Problem {
        Problem::new_untyped(Status::BadRequest, "Current password is incorrect.")
    }

    #[inline]
    pub fn bad_new_password(detail: impl ToString) -> Problem {
        Problem::new_untyped(Status::BadRequest, "Bad password.")
            .detail(detail)
            .clone()
    }
}

pub trait UserDbExt {
    fn users(&self) -> Collection<User>;

    async fn get_user(&self, id: ObjectId) -> mongodb::error::Result<Option<User>>;
    async fn find_user_by_username(
        &self,
        username: impl AsRef<str>,
    ) -> mongodb::error::Result<Option<User>>;

    async fn record_login(&self, id: ObjectId) -> mongodb::error::Result<()>;
    async fn update_password(
        &self,
        id: ObjectId,
        hash: &PasswordHash,
        version: i64,
    ) -> mongodb::error::Result<bool>;
}

impl UserDbExt for Database {
    fn users(&self) -> Collection<User> {
        self.collection(USER_COLLECTION_NAME)
    }

    async fn get_user(&self, id: ObjectId) -> mongodb::error::Result<Option<User>> {
        self.users().find_one(doc! { "_id": id }, None).await
    }

    async fn find_user_by_username(
        &self,
        username: impl AsRef<str>,
    ) -> mongodb::error::Result<Option<User>> {
        self.users()
            .find_one(doc! { "username": username.as_ref() }, None)
            .await
    }

    async fn record_login(&self, id: ObjectId) -> mongodb::error::Result<()> {
        self.users()
            .update_one(
                doc! { "_id": id },
                doc! { "$set": { "lastLogin": bson::DateTime::now() } },
                None,
            )
            .await?;
        Ok(())
    }

    async fn update_password(
        &self,
        id: ObjectId,
        hash: &PasswordHash,
        version: i64,
    ) -> mongodb::error::Result<bool> {
        let result = self
            .users()
            .update_one(
                doc! { "_id": id },
                doc! {
                    "$set": {
                        "passwordHash": hash.as_str(),
                        "passwordVersion": version,
                        "updatedAt": bson::DateTime::now(),
                    }
                },
                None,
            )
            .await?;

        Ok(result.matched_count == 1)
    }
}
