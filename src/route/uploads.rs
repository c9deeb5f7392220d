use mongodb::Database;
use rocket::form::Form;
use rocket::fs::TempFile;
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket::State;

use crate::config::Config;
use crate::data::student::db::problem as student_problem;
use crate::data::student::db::StudentDbExt;
use crate::data::upload::db::UploadDbExt;
use crate::data::upload::{
    DocumentType, DocumentUpload, DocumentUploaded, ProfilePictureUpdated, ReceivedFile,
    UploadPolicy,
};
use crate::media::{MediaStore, MediaUpload, ResourceType};
use crate::resp::jwt::StudentAuth;
use crate::resp::problem::{problems, Problem};

#[derive(Debug, FromForm)]
pub struct DocumentForm<'r> {
    #[field(name = "documentFile")]
    document_file: Option<TempFile<'r>>,
    #[field(name = "documentType")]
    document_type: Option<String>,
}

#[derive(Debug, FromForm)]
pub struct ProfilePictureForm<'r> {
    image: Option<TempFile<'r>>,
}

fn no_file() -> Problem {
    problems::bad_request("No file uploaded.")
}

/// Upload one of the student's documents
#[utoipa::path(
    context_path = "/uploads",
    request_body(
        content = String,
        content_type = "multipart/form-data",
        description = "`documentFile` (image or pdf) and `documentType`"
    ),
    responses(
        (status = 201, description = "Document stored", body = DocumentUploaded),
        (status = 400, description = "Missing file, bad file or unknown document type", body = Problem),
        (status = 502, description = "Media host failed", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/document", data = "<form>")]
#[tracing::instrument(skip(form, db, config, media), fields(user = %auth.user.username))]
pub async fn upload_document(
    form: Form<DocumentForm<'_>>,
    auth: StudentAuth,
    db: &State<Database>,
    config: &State<Config>,
    media: &State<Box<dyn MediaStore>>,
) -> Result<status::Custom<Json<DocumentUploaded>>, Problem> {
    let file = form.document_file.as_ref().ok_or_else(no_file)?;
    let document_type: DocumentType = form
        .document_type
        .as_deref()
        .unwrap_or_default()
        .parse()?;

    let policy = UploadPolicy::documents(config.max_upload_bytes);
    let file = ReceivedFile::read(file, &policy).await?;

    let associate_id = auth.user.username.as_str();
    let stored = media
        .upload(MediaUpload {
            file: file.data_uri(),
            folder: format!("student_documents/{}/{}", associate_id, document_type.as_str()),
            resource_type: ResourceType::Auto,
            public_id: None,
        })
        .await?;

    let upload = DocumentUpload::new(associate_id, document_type, stored.url, stored.public_id);
    db.insert_document_upload(&upload).await?;
    tracing::info!("stored {} document {}", document_type.as_str(), upload.id);

    Ok(status::Custom(
        Status::Created,
        Json(DocumentUploaded {
            message: "Document uploaded and details saved successfully!".to_string(),
            upload_details: upload.into(),
        }),
    ))
}

/// Replace the student's profile picture
#[utoipa::path(
    context_path = "/uploads",
    request_body(
        content = String,
        content_type = "multipart/form-data",
        description = "`image` part"
    ),
    responses(
        (status = 200, description = "Profile picture updated", body = ProfilePictureUpdated),
        (status = 400, description = "Missing or rejected image", body = Problem),
        (status = 404, description = "Student not found", body = Problem),
        (status = 502, description = "Media host failed", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/profile-picture", data = "<form>")]
#[tracing::instrument(skip(form, db, config, media))]
pub async fn upload_profile_picture(
    form: Form<ProfilePictureForm<'_>>,
    auth: StudentAuth,
    db: &State<Database>,
    config: &State<Config>,
    media: &State<Box<dyn MediaStore>>,
) -> Result<Json<ProfilePictureUpdated>, Problem> {
    let image = form.image.as_ref().ok_or_else(no_file)?;

    let policy = UploadPolicy::profile_pictures(config.max_upload_bytes);
    let image = ReceivedFile::read(image, &policy).await?;

    // Nothing is sent to the media host for a student that doesn't exist.
    let student = db.require_student(auth.student_id).await?;

    let stored = media
        .upload(MediaUpload {
            file: image.data_uri(),
            folder: format!("profile_pictures/{}", student.id),
            resource_type: ResourceType::Image,
            public_id: None,
        })
        .await?;

    if !db.set_student_image(student.id, &stored.url).await? {
        return Err(student_problem::not_found());
    }

    Ok(Json(ProfilePictureUpdated {
        message: "Profile picture updated successfully.".to_string(),
        imageurl: stored.url,
    }))
}
