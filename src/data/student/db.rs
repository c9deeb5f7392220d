use bson::doc;
use bson::oid::ObjectId;
use mongodb::{Collection, Database};

use super::{Student, STUDENT_COLLECTION_NAME};
use crate::resp::problem::Problem;

pub mod problem {
    use crate::resp::problem::Problem;
    use rocket::http::Status;

    #[inline]
    pub fn not_found() -> Problem {
        Problem::new_untyped(Status::NotFound, "Student not found.")
    }
}

pub trait StudentDbExt {
    fn students(&self) -> Collection<Student>;

    async fn get_student(&self, id: ObjectId) -> mongodb::error::Result<Option<Student>>;
    async fn require_student(&self, id: ObjectId) -> Result<Student, Problem>;
    async fn set_student_image(&self, id: ObjectId, url: &str) -> mongodb::error::Result<bool>;
}

impl StudentDbExt for Database {
    fn students(&self) -> Collection<Student> {
        self.collection(STUDENT_COLLECTION_NAME)
    }

    async fn get_student(&self, id: ObjectId) -> mongodb::error::Result<Option<Student>> {
        self.students().find_one(doc! { "_id": id }, None).await
    }

    async fn require_student(&self, id: ObjectId) -> Result<Student, Problem> {
        self.get_student(id).await?.ok_or_else(problem::not_found)
    }

    async fn set_student_image(&self, id: ObjectId, url: &str) -> mongodb::error::Result<bool> {
        let result = self
            .students()
            .update_one(
                doc! { "_id": id },
                doc! { "$set": { "imageurl": url, "updatedAt": bson::DateTime::now() } },
                None,
            )
            .await?;

        Ok(result.matched_count == 1)
    }
}
