use mongodb::Database;
use rocket::serde::json::Json;
use rocket::State;

use crate::data::student::db::StudentDbExt;
use crate::data::student::{
    ParentDetails, ParentResponse, PersonalDetails, PersonalResponse, ProfileResponse,
    StudentProfile,
};
use crate::resp::jwt::StudentAuth;
use crate::resp::problem::Problem;

#[utoipa::path(
    context_path = "/profile",
    responses(
        (status = 200, description = "Student profile", body = ProfileResponse),
        (status = 403, description = "Not a student account", body = Problem),
        (status = 404, description = "Student not found", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/student")]
#[tracing::instrument(skip(db))]
pub async fn student_profile(
    auth: StudentAuth,
    db: &State<Database>,
) -> Result<Json<ProfileResponse>, Problem> {
    let student = db.require_student(auth.student_id).await?;

    Ok(Json(ProfileResponse {
        profile: StudentProfile::from(student),
        message: "Profile fetched successfully.".to_string(),
    }))
}

#[utoipa::path(
    context_path = "/profile",
    responses(
        (status = 200, description = "Student contact details", body = PersonalResponse),
        (status = 404, description = "Student not found", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/personal-student")]
#[tracing::instrument(skip(db))]
pub async fn personal_details(
    auth: StudentAuth,
    db: &State<Database>,
) -> Result<Json<PersonalResponse>, Problem> {
    let student = db.require_student(auth.student_id).await?;

    Ok(Json(PersonalResponse {
        personal: PersonalDetails::from(student),
        message: "Personal details fetched successfully.".to_string(),
    }))
}

#[utoipa::path(
    context_path = "/profile",
    responses(
        (status = 200, description = "Student parents", body = ParentResponse),
        (status = 404, description = "Student not found", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/student-parents")]
#[tracing::instrument(skip(db))]
pub async fn parent_details(
    auth: StudentAuth,
    db: &State<Database>,
) -> Result<Json<ParentResponse>, Problem> {
    let student = db.require_student(auth.student_id).await?;

    Ok(Json(ParentResponse {
        parent: ParentDetails::from(student),
        message: "Parent details fetched successfully.".to_string(),
    }))
}
