use bson::oid::ObjectId;
use bson::serde_helpers::serialize_object_id_as_hex_string;
use bson::{doc, Document};
use chrono::{DateTime, Utc};
use rocket::http::Status;
use utoipa::ToSchema;

use crate::data::upload::mime;
use crate::resp::problem::Problem;
use crate::util::{bson_date, bson_number};

pub mod db;

pub static ASSIGNMENT_COLLECTION_NAME: &str = "assignments";
pub static STUDENT_ASSIGNMENT_COLLECTION_NAME: &str = "studentAssignments";
pub static ASSIGNMENT_UPLOAD_COLLECTION_NAME: &str = "assignmentuploads";

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
pub enum AssignmentType {
    Essay,
    Quiz,
    Coding,
    Project,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    #[serde(with = "bson_number")]
    pub question_number: i64,
    pub question_text: String,
    pub max_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub file_name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub course_id: ObjectId,
    pub faculty_id: ObjectId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub assignment_type: AssignmentType,
    pub total_marks: f64,
    pub due_date: bson::DateTime,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// A submission received at `received` is late when it's after the due date.
pub fn is_late(received: DateTime<Utc>, due: DateTime<Utc>) -> bool {
    received > due
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
pub enum SubmissionStatus {
    #[default]
    Assigned,
    Submitted,
    Completed,
}

impl SubmissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionStatus::Assigned => "Assigned",
            SubmissionStatus::Submitted => "Submitted",
            SubmissionStatus::Completed => "Completed",
        }
    }

    pub fn parse(value: &str) -> Result<SubmissionStatus, Problem> {
        match value {
            "Assigned" => Ok(SubmissionStatus::Assigned),
            "Submitted" => Ok(SubmissionStatus::Submitted),
            "Completed" => Ok(SubmissionStatus::Completed),
            other => Err(Problem::new_untyped(Status::BadRequest, "Invalid status filter.")
                .insert_str("status", other)
                .clone()),
        }
    }
}

/// Match stage selecting a student's assignment rows. `Completed` means graded.
pub fn status_filter(student_id: ObjectId, status: Option<SubmissionStatus>) -> Document {
    let mut filter = doc! { "studentId": student_id };
    match status {
        Some(SubmissionStatus::Completed) => {
            filter.insert("grade", doc! { "$ne": bson::Bson::Null });
        }
        Some(other) => {
            filter.insert("status", other.as_str());
        }
        None => {}
    }
    filter
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionContent {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub answers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAssignment {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub assignment_id: ObjectId,
    pub student_id: ObjectId,
    #[serde(default)]
    pub course_id: Option<ObjectId>,
    #[serde(default)]
    pub status: SubmissionStatus,
    #[serde(default)]
    pub submission_date: Option<bson::DateTime>,
    #[serde(default)]
    pub submission_content: SubmissionContent,
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub graded_at: Option<bson::DateTime>,
    #[serde(default)]
    pub is_late: bool,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Doc,
    Docx,
}

impl FileType {
    pub fn from_mime(value: &str) -> Option<FileType> {
        match value {
            mime::PDF => Some(FileType::Pdf),
            mime::DOC => Some(FileType::Doc),
            mime::DOCX => Some(FileType::Docx),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            FileType::Pdf => "pdf",
            FileType::Doc => "doc",
            FileType::Docx => "docx",
        }
    }
}

/// A submitted file after it reached the media host.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSubmissionFile {
    pub file_name: String,
    pub file_url: String,
    pub file_size: i64,
    pub file_type: FileType,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentUpload {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub assignment_id: ObjectId,
    pub student_id: ObjectId,
    pub course_id: ObjectId,
    pub file_url: String,
    pub file_name: String,
    #[serde(with = "bson_number")]
    pub file_size: i64,
    pub file_type: FileType,
    pub uploaded_at: bson::DateTime,
    #[serde(default)]
    pub created_at: Option<bson::DateTime>,
    #[serde(default)]
    pub updated_at: Option<bson::DateTime>,
}

impl AssignmentUpload {
    pub fn new(assignment: &Assignment, student_id: ObjectId, file: StoredSubmissionFile) -> Self {
        let now = bson::DateTime::now();
        AssignmentUpload {
            id: ObjectId::new(),
            assignment_id: assignment.id,
            student_id,
            course_id: assignment.course_id,
            file_url: file.file_url,
            file_name: file.file_name,
            file_size: file.file_size,
            file_type: file.file_type,
            uploaded_at: bson::DateTime::from_chrono(file.uploaded_at),
            created_at: Some(now),
            updated_at: Some(now),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentListItem {
    #[serde(rename = "_id", serialize_with = "serialize_object_id_as_hex_string")]
    #[schema(value_type = String)]
    pub id: ObjectId,
    pub title: String,
    pub status: SubmissionStatus,
    pub total_marks: f64,
    #[serde(with = "bson_date")]
    pub due_date: DateTime<Utc>,
    #[serde(default)]
    pub description: String,
    pub assignment_type: AssignmentType,
    pub course_name: String,
    pub faculty_name: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentList {
    pub assignments: Vec<AssignmentListItem>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentPreview {
    #[serde(rename = "_id", serialize_with = "serialize_object_id_as_hex_string")]
    #[schema(value_type = String)]
    pub id: ObjectId,
    /// Only present in the full view.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "crate::util::serialize_opt_object_id_as_hex"
    )]
    #[schema(value_type = Option<String>)]
    pub course_id: Option<ObjectId>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "crate::util::serialize_opt_object_id_as_hex"
    )]
    #[schema(value_type = Option<String>)]
    pub faculty_id: Option<ObjectId>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub assignment_type: AssignmentType,
    pub total_marks: f64,
    #[serde(with = "bson_date")]
    pub due_date: DateTime<Utc>,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,
    pub course_name: String,
    pub faculty_name: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub assignment: AssignmentPreview,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Guidelines {
    pub max_file_size: &'static str,
    pub accepted_formats: Vec<FileType>,
    pub additional_info: &'static str,
    pub assignment_type: AssignmentType,
}

impl Guidelines {
    pub fn for_type(assignment_type: AssignmentType) -> Guidelines {
        Guidelines {
            max_file_size: "10MB",
            accepted_formats: vec![FileType::Pdf, FileType::Doc, FileType::Docx],
            additional_info:
                "Ensure your submission is a single file containing answers to all questions.",
            assignment_type,
        }
    }
}

/// The student's side of an assignment.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionView {
    pub status: SubmissionStatus,
    pub submission_date: Option<DateTime<Utc>>,
    pub submission_content: SubmissionContent,
    pub grade: Option<String>,
    pub feedback: Option<String>,
    pub is_late: bool,
}

impl From<StudentAssignment> for SubmissionView {
    fn from(value: StudentAssignment) -> Self {
        SubmissionView {
            status: value.status,
            submission_date: value.submission_date.map(|it| it.to_chrono()),
            submission_content: value.submission_content,
            grade: value.grade,
            feedback: value.feedback,
            is_late: value.is_late,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FullAssignment {
    #[serde(flatten)]
    pub assignment: AssignmentPreview,
    pub submission: Option<SubmissionView>,
    pub guidelines: Guidelines,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FullAssignmentResponse {
    pub assignment: FullAssignment,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub status: SubmissionStatus,
    pub submission_date: Option<DateTime<Utc>>,
    pub file_url: Option<String>,
    pub is_late: bool,
}

impl From<StudentAssignment> for SubmissionReceipt {
    fn from(value: StudentAssignment) -> Self {
        SubmissionReceipt {
            status: value.status,
            submission_date: value.submission_date.map(|it| it.to_chrono()),
            file_url: value.submission_content.file_url,
            is_late: value.is_late,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub submission: SubmissionReceipt,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionSummary {
    pub status: SubmissionStatus,
    pub submission_date: Option<DateTime<Utc>>,
    pub grade: Option<String>,
    pub feedback: Option<String>,
    pub is_late: bool,
}

impl From<StudentAssignment> for SubmissionSummary {
    fn from(value: StudentAssignment) -> Self {
        SubmissionSummary {
            status: value.status,
            submission_date: value.submission_date.map(|it| it.to_chrono()),
            grade: value.grade,
            feedback: value.feedback,
            is_late: value.is_late,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub file_name: String,
    pub file_url: String,
    pub file_size: i64,
    pub file_type: FileType,
    pub uploaded_at: DateTime<Utc>,
}

impl From<AssignmentUpload> for UploadedFile {
    fn from(value: AssignmentUpload) -> Self {
        UploadedFile {
            file_name: value.file_name,
            file_url: value.file_url,
            file_size: value.file_size,
            file_type: value.file_type,
            uploaded_at: value.uploaded_at.to_chrono(),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionHistory {
    pub submission: Option<SubmissionSummary>,
    pub uploads: Vec<UploadedFile>,
    pub message: String,
}
