use bson::oid::ObjectId;
use bson::{doc, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument};
use mongodb::{Collection, Database, IndexModel};
use rocket::futures::TryStreamExt;

use super::*;
use crate::data::course::{COURSE_COLLECTION_NAME, FACULTY_COLLECTION_NAME};
use crate::resp::problem::problems;

pub mod problem {
    use crate::resp::problem::Problem;
    use rocket::http::Status;

    #[inline]
    pub fn not_found() -> Problem {
        Problem::new_untyped(Status::NotFound, "Assignment not found.")
    }

    #[inline]
    pub fn no_files() -> Problem {
        Problem::new_untyped(Status::BadRequest, "No files uploaded.")
    }
}

/// Joins course and faculty documents referenced by the fields at `prefix`.
fn course_and_faculty(prefix: &str) -> Vec<Document> {
    vec![
        doc! {
            "$lookup": {
                "from": COURSE_COLLECTION_NAME,
                "localField": format!("{}courseId", prefix),
                "foreignField": "_id",
                "as": "course",
            }
        },
        doc! { "$unwind": "$course" },
        doc! {
            "$lookup": {
                "from": FACULTY_COLLECTION_NAME,
                "localField": format!("{}facultyId", prefix),
                "foreignField": "_id",
                "as": "faculty",
            }
        },
        doc! { "$unwind": "$faculty" },
    ]
}

fn faculty_name() -> Document {
    doc! { "$concat": ["$faculty.firstName", " ", "$faculty.lastName"] }
}

fn decode_rows<T: serde::de::DeserializeOwned>(rows: Vec<Document>) -> mongodb::error::Result<Vec<T>> {
    rows.into_iter()
        .map(|it| bson::from_document(it).map_err(mongodb::error::Error::from))
        .collect()
}

const DUPLICATE_KEY: i32 = 11000;

fn is_duplicate_key(e: &mongodb::error::Error) -> bool {
    match e.kind.as_ref() {
        ErrorKind::Command(command) => command.code == DUPLICATE_KEY,
        ErrorKind::Write(WriteFailure::WriteError(write)) => write.code == DUPLICATE_KEY,
        _ => false,
    }
}

/// A student holds at most one current submission per assignment.
pub fn submission_index() -> IndexModel {
    IndexModel::builder()
        .keys(doc! { "assignmentId": 1, "studentId": 1 })
        .options(IndexOptions::builder().unique(true).build())
        .build()
}

/// Filter and update that record a submission as the student's current one.
pub fn submission_upsert(
    assignment: &Assignment,
    student_id: ObjectId,
    file_url: &str,
    late: bool,
    now: bson::DateTime,
) -> (Document, Document) {
    let filter = doc! { "assignmentId": assignment.id, "studentId": student_id };
    let update = doc! {
        "$set": {
            "status": SubmissionStatus::Submitted.as_str(),
            "submissionDate": now,
            "submissionContent": {
                "text": bson::Bson::Null,
                "fileUrl": file_url,
                "answers": [],
            },
            "isLate": late,
            "updatedAt": now,
        },
        "$setOnInsert": {
            "courseId": assignment.course_id,
            "createdAt": now,
        },
    };
    (filter, update)
}

/// One assignment joined with its course and faculty. The detailed view keeps
/// the reference ids and attachments the preview leaves out.
pub fn assignment_pipeline(id: ObjectId, detailed: bool) -> Vec<Document> {
    let mut projection = doc! {
        "_id": 1,
        "title": 1,
        "description": 1,
        "assignmentType": 1,
        "totalMarks": 1,
        "dueDate": 1,
        "questions": 1,
        "courseName": "$course.courseName",
        "facultyName": faculty_name(),
    };
    if detailed {
        projection.insert("courseId", 1);
        projection.insert("facultyId", 1);
        projection.insert("attachments", 1);
    }

    let mut pipeline = vec![doc! { "$match": { "_id": id } }];
    pipeline.extend(course_and_faculty(""));
    pipeline.push(doc! { "$project": projection });
    pipeline
}

pub trait AssignmentDbExt {
    fn assignments(&self) -> Collection<Assignment>;
    fn student_assignments(&self) -> Collection<StudentAssignment>;
    fn assignment_uploads(&self) -> Collection<AssignmentUpload>;

    async fn get_assignment(&self, id: ObjectId) -> mongodb::error::Result<Option<Assignment>>;
    async fn list_student_assignments(
        &self,
        student_id: ObjectId,
        status: Option<SubmissionStatus>,
    ) -> mongodb::error::Result<Vec<AssignmentListItem>>;
    async fn assignment_preview(
        &self,
        id: ObjectId,
    ) -> mongodb::error::Result<Option<AssignmentPreview>>;
    /// The preview plus course, faculty and attachment fields.
    async fn assignment_detail(
        &self,
        id: ObjectId,
    ) -> mongodb::error::Result<Option<AssignmentPreview>>;
    async fn find_assignment_view(
        &self,
        pipeline: Vec<Document>,
    ) -> mongodb::error::Result<Option<AssignmentPreview>>;

    async fn student_assignment(
        &self,
        assignment_id: ObjectId,
        student_id: ObjectId,
    ) -> mongodb::error::Result<Option<StudentAssignment>>;
    async fn submission_uploads(
        &self,
        assignment_id: ObjectId,
        student_id: ObjectId,
    ) -> mongodb::error::Result<Vec<AssignmentUpload>>;

    async fn record_submission(
        &self,
        assignment: &Assignment,
        student_id: ObjectId,
        files: Vec<StoredSubmissionFile>,
    ) -> Result<StudentAssignment, Problem>;

    async fn ensure_assignment_indexes(&self) -> mongodb::error::Result<()>;
}

impl AssignmentDbExt for Database {
    fn assignments(&self) -> Collection<Assignment> {
        self.collection(ASSIGNMENT_COLLECTION_NAME)
    }

    fn student_assignments(&self) -> Collection<StudentAssignment> {
        self.collection(STUDENT_ASSIGNMENT_COLLECTION_NAME)
    }

    fn assignment_uploads(&self) -> Collection<AssignmentUpload> {
        self.collection(ASSIGNMENT_UPLOAD_COLLECTION_NAME)
    }

    async fn get_assignment(&self, id: ObjectId) -> mongodb::error::Result<Option<Assignment>> {
        self.assignments().find_one(doc! { "_id": id }, None).await
    }

    async fn list_student_assignments(
        &self,
        student_id: ObjectId,
        status: Option<SubmissionStatus>,
    ) -> mongodb::error::Result<Vec<AssignmentListItem>> {
        let mut pipeline = vec![
            doc! { "$match": status_filter(student_id, status) },
            doc! {
                "$lookup": {
                    "from": ASSIGNMENT_COLLECTION_NAME,
                    "localField": "assignmentId",
                    "foreignField": "_id",
                    "as": "assignment",
                }
            },
            doc! { "$unwind": "$assignment" },
        ];
        pipeline.extend(course_and_faculty("assignment."));
        pipeline.push(doc! {
            "$project": {
                "_id": "$assignment._id",
                "title": "$assignment.title",
                "status": "$status",
                "totalMarks": "$assignment.totalMarks",
                "dueDate": "$assignment.dueDate",
                "description": "$assignment.description",
                "assignmentType": "$assignment.assignmentType",
                "courseName": "$course.courseName",
                "facultyName": faculty_name(),
            }
        });

        let rows: Vec<Document> = self
            .student_assignments()
            .aggregate(pipeline, None)
            .await?
            .try_collect()
            .await?;

        decode_rows(rows)
    }

    async fn assignment_preview(
        &self,
        id: ObjectId,
    ) -> mongodb::error::Result<Option<AssignmentPreview>> {
        self.find_assignment_view(assignment_pipeline(id, false)).await
    }

    async fn assignment_detail(
        &self,
        id: ObjectId,
    ) -> mongodb::error::Result<Option<AssignmentPreview>> {
        self.find_assignment_view(assignment_pipeline(id, true)).await
    }

    async fn find_assignment_view(
        &self,
        pipeline: Vec<Document>,
    ) -> mongodb::error::Result<Option<AssignmentPreview>> {
        let rows: Vec<Document> = self
            .assignments()
            .aggregate(pipeline, None)
            .await?
            .try_collect()
            .await?;

        Ok(decode_rows(rows)?.into_iter().next())
    }

    async fn student_assignment(
        &self,
        assignment_id: ObjectId,
        student_id: ObjectId,
    ) -> mongodb::error::Result<Option<StudentAssignment>> {
        self.student_assignments()
            .find_one(
                doc! { "assignmentId": assignment_id, "studentId": student_id },
                None,
            )
            .await
    }

    async fn submission_uploads(
        &self,
        assignment_id: ObjectId,
        student_id: ObjectId,
    ) -> mongodb::error::Result<Vec<AssignmentUpload>> {
        let options = FindOptions::builder()
            .sort(doc! { "uploadedAt": 1, "_id": 1 })
            .build();

        self.assignment_uploads()
            .find(
                doc! { "assignmentId": assignment_id, "studentId": student_id },
                options,
            )
            .await?
            .try_collect()
            .await
    }

    async fn record_submission(
        &self,
        assignment: &Assignment,
        student_id: ObjectId,
        files: Vec<StoredSubmissionFile>,
    ) -> Result<StudentAssignment, Problem> {
        let first = files.first().ok_or_else(problem::no_files)?;
        let now = bson::DateTime::now();
        let late = is_late(first.uploaded_at, assignment.due_date.to_chrono());

        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();
        let (filter, update) =
            submission_upsert(assignment, student_id, &first.file_url, late, now);

        let collection = self.student_assignments();
        let updated = match collection
            .find_one_and_update(filter.clone(), update.clone(), options.clone())
            .await
        {
            // A concurrent first submission inserted the record; this one updates it.
            Err(e) if is_duplicate_key(&e) => {
                tracing::debug!("submission for {} raced an insert, retrying", assignment.id);
                collection.find_one_and_update(filter, update, options).await?
            }
            other => other?,
        }
        .ok_or_else(|| problems::server_error("Could not submit assignment."))?;

        let uploads: Vec<AssignmentUpload> = files
            .into_iter()
            .map(|file| AssignmentUpload::new(assignment, student_id, file))
            .collect();
        self.assignment_uploads().insert_many(uploads, None).await?;

        Ok(updated)
    }

    async fn ensure_assignment_indexes(&self) -> mongodb::error::Result<()> {
        self.student_assignments()
            .create_index(submission_index(), None)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rocket::local::asynchronous::Client;

    fn assignment(due: chrono::DateTime<Utc>) -> Assignment {
        Assignment {
            id: ObjectId::new(),
            course_id: ObjectId::new(),
            faculty_id: ObjectId::new(),
            title: "Resubmission".to_string(),
            description: String::new(),
            assignment_type: AssignmentType::Essay,
            total_marks: 10.0,
            due_date: bson::DateTime::from_chrono(due),
            questions: vec![],
            attachments: vec![],
        }
    }

    fn stored(name: &str) -> StoredSubmissionFile {
        StoredSubmissionFile {
            file_name: format!("{}.pdf", name),
            file_url: format!("https://media.example.com/{}.pdf", name),
            file_size: 1024,
            file_type: FileType::Pdf,
            uploaded_at: Utc::now(),
        }
    }

    #[test]
    fn submissions_are_unique_per_student() {
        let index = submission_index();
        assert_eq!(index.keys, doc! { "assignmentId": 1, "studentId": 1 });
        assert_eq!(index.options.and_then(|it| it.unique), Some(true));
    }

    #[test]
    fn resubmitting_overwrites_only_current_fields() {
        let overdue = assignment(Utc::now() - Duration::days(1));
        let student = ObjectId::new();
        let now = bson::DateTime::now();

        let (filter, update) =
            submission_upsert(&overdue, student, "https://media.example.com/a.pdf", true, now);
        assert_eq!(filter, doc! { "assignmentId": overdue.id, "studentId": student });

        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_str("status").unwrap(), "Submitted");
        assert!(set.get_bool("isLate").unwrap());
        assert_eq!(
            set.get_document("submissionContent").unwrap().get_str("fileUrl").unwrap(),
            "https://media.example.com/a.pdf"
        );

        // Creation fields are written once, on the first submission.
        let on_insert = update.get_document("$setOnInsert").unwrap();
        assert!(on_insert.contains_key("createdAt"));
        assert!(!set.contains_key("createdAt"));
    }

    #[test]
    fn preview_leaves_out_references_and_attachments() {
        let id = ObjectId::new();
        let projection = |detailed| {
            assignment_pipeline(id, detailed)
                .last()
                .and_then(|it| it.get_document("$project").ok().cloned())
                .expect("projection stage")
        };

        let preview = projection(false);
        for hidden in ["courseId", "facultyId", "attachments"] {
            assert!(!preview.contains_key(hidden), "{}", hidden);
        }
        assert!(preview.contains_key("questions"));
        assert!(preview.contains_key("facultyName"));

        let detail = projection(true);
        for shown in ["courseId", "facultyId", "attachments", "questions"] {
            assert!(detail.contains_key(shown), "{}", shown);
        }
    }

    #[rocket::async_test]
    #[ignore = "requires a running MongoDB instance"]
    async fn concurrent_first_submissions_share_one_record() {
        let client = Client::tracked(crate::create(None).await.expect("backend should start"))
            .await
            .expect("invalid backend");
        let db: &Database = client.rocket().state().unwrap();

        let open = assignment(Utc::now() + Duration::days(7));
        db.assignments().insert_one(&open, None).await.unwrap();
        let student = ObjectId::new();

        let (a, b) = tokio::join!(
            db.record_submission(&open, student, vec![stored("left")]),
            db.record_submission(&open, student, vec![stored("right")]),
        );
        assert_eq!(a.unwrap().id, b.unwrap().id);

        let records = db
            .student_assignments()
            .count_documents(doc! { "assignmentId": open.id, "studentId": student }, None)
            .await
            .unwrap();
        assert_eq!(records, 1);

        let filter = doc! { "assignmentId": open.id };
        db.assignment_uploads().delete_many(filter.clone(), None).await.unwrap();
        db.student_assignments().delete_many(filter, None).await.unwrap();
        db.assignments().delete_one(doc! { "_id": open.id }, None).await.unwrap();
    }

    #[rocket::async_test]
    #[ignore = "requires a running MongoDB instance"]
    async fn resubmission_updates_the_current_record() {
        let client = Client::tracked(crate::create(None).await.expect("backend should start"))
            .await
            .expect("invalid backend");
        let db: &Database = client.rocket().state().unwrap();

        let overdue = assignment(Utc::now() - Duration::days(1));
        db.assignments().insert_one(&overdue, None).await.unwrap();
        let student = ObjectId::new();

        let first = db
            .record_submission(&overdue, student, vec![stored("first")])
            .await
            .unwrap();
        assert!(first.is_late);

        let second = db
            .record_submission(&overdue, student, vec![stored("second"), stored("appendix")])
            .await
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(
            second.submission_content.file_url.as_deref(),
            Some("https://media.example.com/second.pdf")
        );

        let records = db
            .student_assignments()
            .count_documents(doc! { "assignmentId": overdue.id, "studentId": student }, None)
            .await
            .unwrap();
        assert_eq!(records, 1);

        let uploads = db.submission_uploads(overdue.id, student).await.unwrap();
        assert_eq!(uploads.len(), 3);

        let filter = doc! { "assignmentId": overdue.id };
        db.assignment_uploads().delete_many(filter.clone(), None).await.unwrap();
        db.student_assignments().delete_many(filter, None).await.unwrap();
        db.assignments().delete_one(doc! { "_id": overdue.id }, None).await.unwrap();
    }

    #[rocket::async_test]
    #[ignore = "requires a running MongoDB instance"]
    async fn empty_submissions_are_rejected() {
        let client = Client::tracked(crate::create(None).await.expect("backend should start"))
            .await
            .expect("invalid backend");
        let db: &Database = client.rocket().state().unwrap();

        let open = assignment(Utc::now() + Duration::days(7));
        let problem = db
            .record_submission(&open, ObjectId::new(), vec![])
            .await
            .unwrap_err();
        assert_eq!(problem.status, rocket::http::Status::BadRequest);
    }
}
