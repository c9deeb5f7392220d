use chrono::{DateTime, Utc};
use mongodb::Database;
use rocket::form::Form;
use rocket::fs::TempFile;
use rocket::serde::json::Json;
use rocket::State;

use crate::config::Config;
use crate::data::assignment::db::problem as assignment_problem;
use crate::data::assignment::db::AssignmentDbExt;
use crate::data::assignment::{
    AssignmentList, FileType, FullAssignment, FullAssignmentResponse, Guidelines,
    PreviewResponse, StoredSubmissionFile, SubmissionHistory, SubmissionStatus, SubmitResponse,
};
use crate::data::upload::{ReceivedFile, UploadPolicy};
use crate::media::{MediaStore, MediaUpload, ResourceType};
use crate::resp::jwt::StudentAuth;
use crate::resp::problem::{problems, Problem};
use crate::util::parse_object_id;

#[derive(Debug, FromForm)]
pub struct SubmissionForm<'r> {
    files: Vec<TempFile<'r>>,
}

/// Checks every file against `policy`, then stores them all under `folder`.
///
/// Nothing is sent to the media host unless every file passes.
pub async fn store_submission_files(
    files: &[TempFile<'_>],
    policy: &UploadPolicy,
    media: &dyn MediaStore,
    folder: &str,
    received_at: DateTime<Utc>,
) -> Result<Vec<StoredSubmissionFile>, Problem> {
    let mut received = Vec::with_capacity(files.len());
    for file in files {
        let file = ReceivedFile::read(file, policy).await?;
        let file_type = FileType::from_mime(&file.mime)
            .ok_or_else(|| problems::bad_request(policy.rejection))?;
        received.push((file, file_type));
    }

    let mut stored = Vec::with_capacity(received.len());
    for (file, file_type) in received {
        let media_file = media
            .upload(MediaUpload {
                file: file.data_uri(),
                folder: folder.to_string(),
                resource_type: ResourceType::Raw,
                public_id: None,
            })
            .await?;

        stored.push(StoredSubmissionFile {
            file_name: format!("{}.{}", file.name, file_type.extension()),
            file_url: media_file.url,
            file_size: file.size() as i64,
            file_type,
            uploaded_at: received_at,
        });
    }

    Ok(stored)
}

/// List the student's assignments, optionally filtered by submission status
#[utoipa::path(
    params(
        ("status", description = "Assigned, Submitted or Completed"),
    ),
    responses(
        (status = 200, description = "The student's assignments", body = AssignmentList),
        (status = 400, description = "Unknown status filter", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/assignments?<status>")]
#[tracing::instrument(skip(db))]
pub async fn assignment_list(
    status: Option<&str>,
    auth: StudentAuth,
    db: &State<Database>,
) -> Result<Json<AssignmentList>, Problem> {
    let status = status.map(SubmissionStatus::parse).transpose()?;
    let assignments = db.list_student_assignments(auth.student_id, status).await?;

    Ok(Json(AssignmentList {
        message: format!("{} assignment(s) found.", assignments.len()),
        assignments,
    }))
}

#[utoipa::path(
    params(("id", description = "assignment ID")),
    responses(
        (status = 200, description = "Assignment with course and faculty", body = PreviewResponse),
        (status = 400, description = "Malformed id", body = Problem),
        (status = 404, description = "Assignment not found", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/assignments/<id>/preview")]
#[tracing::instrument(skip(db))]
pub async fn assignment_preview(
    id: &str,
    auth: StudentAuth,
    db: &State<Database>,
) -> Result<Json<PreviewResponse>, Problem> {
    let id = parse_object_id("assignment", id)?;
    let assignment = db
        .assignment_preview(id)
        .await?
        .ok_or_else(assignment_problem::not_found)?;

    Ok(Json(PreviewResponse {
        assignment,
        message: "Assignment preview fetched successfully.".to_string(),
    }))
}

#[utoipa::path(
    params(("id", description = "assignment ID")),
    responses(
        (status = 200, description = "Assignment, submission and guidelines", body = FullAssignmentResponse),
        (status = 404, description = "Assignment not found", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/assignments/<id>")]
#[tracing::instrument(skip(db))]
pub async fn assignment_full(
    id: &str,
    auth: StudentAuth,
    db: &State<Database>,
) -> Result<Json<FullAssignmentResponse>, Problem> {
    let id = parse_object_id("assignment", id)?;
    let assignment = db
        .assignment_detail(id)
        .await?
        .ok_or_else(assignment_problem::not_found)?;
    let submission = db.student_assignment(id, auth.student_id).await?;

    Ok(Json(FullAssignmentResponse {
        assignment: FullAssignment {
            guidelines: Guidelines::for_type(assignment.assignment_type),
            assignment,
            submission: submission.map(Into::into),
        },
        message: "Assignment fetched successfully.".to_string(),
    }))
}

/// Submit files for an assignment
///
/// Resubmitting replaces the recorded submission; every uploaded file is kept.
#[utoipa::path(
    params(("id", description = "assignment ID")),
    request_body(
        content = String,
        content_type = "multipart/form-data",
        description = "One or more `files` parts (pdf, doc or docx)"
    ),
    responses(
        (status = 200, description = "Submission recorded", body = SubmitResponse),
        (status = 400, description = "No files, or a file was rejected", body = Problem),
        (status = 404, description = "Assignment not found", body = Problem),
        (status = 502, description = "Media host failed", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/assignments/<id>/submit", data = "<form>")]
#[tracing::instrument(skip(form, db, config, media), fields(files = form.files.len()))]
pub async fn assignment_submit(
    id: &str,
    form: Form<SubmissionForm<'_>>,
    auth: StudentAuth,
    db: &State<Database>,
    config: &State<Config>,
    media: &State<Box<dyn MediaStore>>,
) -> Result<Json<SubmitResponse>, Problem> {
    let received_at = Utc::now();
    let id = parse_object_id("assignment", id)?;

    if form.files.is_empty() {
        return Err(assignment_problem::no_files());
    }

    let assignment = db
        .get_assignment(id)
        .await?
        .ok_or_else(assignment_problem::not_found)?;

    let folder = format!("submissions/{}/{}", assignment.id, auth.student_id);
    let policy = UploadPolicy::submissions(config.max_upload_bytes);
    let stored =
        store_submission_files(&form.files, &policy, media.inner().as_ref(), &folder, received_at)
            .await?;

    let submission = db.record_submission(&assignment, auth.student_id, stored).await?;
    tracing::info!(
        "student {} submitted assignment {} (late: {})",
        auth.student_id,
        assignment.id,
        submission.is_late
    );

    Ok(Json(SubmitResponse {
        submission: submission.into(),
        message: "Assignment submitted successfully.".to_string(),
    }))
}

#[utoipa::path(
    params(("id", description = "assignment ID")),
    responses(
        (status = 200, description = "Current submission and every uploaded file", body = SubmissionHistory),
        (status = 404, description = "Assignment not found", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/assignments/<id>/submissions")]
#[tracing::instrument(skip(db))]
pub async fn assignment_submissions(
    id: &str,
    auth: StudentAuth,
    db: &State<Database>,
) -> Result<Json<SubmissionHistory>, Problem> {
    let id = parse_object_id("assignment", id)?;
    if db.get_assignment(id).await?.is_none() {
        return Err(assignment_problem::not_found());
    }

    let submission = db.student_assignment(id, auth.student_id).await?;
    let uploads = db.submission_uploads(id, auth.student_id).await?;

    Ok(Json(SubmissionHistory {
        submission: submission.map(Into::into),
        uploads: uploads.into_iter().map(Into::into).collect(),
        message: "Submission history fetched successfully.".to_string(),
    }))
}
