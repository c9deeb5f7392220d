use std::collections::BTreeMap;

use rocket::http::Status;
use rocket::{Build, Request, Rocket, Route};

pub mod assignments;
pub mod auth;
pub mod profile;
pub mod students;
pub mod uploads;

use assignments::*;
use auth::*;
use profile::*;
use students::*;
use uploads::*;

use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    data::{
        academic as ad, assignment as asd, course as cd, student as sd, upload as ud,
        user as usd,
    },
    resp::{
        jwt::{doc::JWTAuth, GuardProblem},
        problem::Problem,
    },
    role::Role,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        login,
        change_password,
        student_profile,
        personal_details,
        parent_details,
        student_details,
        total_credits,
        current_cgpa,
        courses_registered,
        courses_completed,
        attendance,
        upcoming_exam,
        calendar,
        assignment_list,
        assignment_preview,
        assignment_full,
        assignment_submit,
        assignment_submissions,
        upload_document,
        upload_profile_picture
    ),
    components(schemas(
        Role,
        usd::LoginData,
        usd::LoginResponse,
        usd::ChangePasswordData,
        usd::PasswordChanged,
        sd::Gender,
        sd::StudentStatus,
        sd::Contact,
        sd::Address,
        sd::Parent,
        sd::StudentProfile,
        sd::PersonalDetails,
        sd::ParentDetails,
        sd::StudentDetails,
        sd::ProfileResponse,
        sd::PersonalResponse,
        sd::ParentResponse,
        sd::StudentDetailsResponse,
        cd::EnrollmentStatus,
        cd::TotalCreditsResponse,
        cd::CgpaResponse,
        cd::RegisteredCourse,
        cd::CompletedCourse,
        cd::RegisteredCourses,
        cd::CompletedCourses,
        ad::CohortYear,
        ad::AttendanceResponse,
        ad::NearestExam,
        ad::NearestExamResponse,
        ad::CalendarEntry,
        ad::CalendarResponse,
        asd::AssignmentType,
        asd::Question,
        asd::Attachment,
        asd::SubmissionStatus,
        asd::SubmissionContent,
        asd::FileType,
        asd::AssignmentListItem,
        asd::AssignmentList,
        asd::AssignmentPreview,
        asd::PreviewResponse,
        asd::Guidelines,
        asd::SubmissionView,
        asd::FullAssignment,
        asd::FullAssignmentResponse,
        asd::SubmissionReceipt,
        asd::SubmitResponse,
        asd::SubmissionSummary,
        asd::UploadedFile,
        asd::SubmissionHistory,
        ud::DocumentType,
        ud::UploadDetails,
        ud::DocumentUploaded,
        ud::ProfilePictureUpdated,
        Problem
    )),
    modifiers(&JWTAuth, &API_PREFIX)
)]
pub struct ApiDoc;

pub struct PathPrefix(pub &'static str);
static API_PREFIX: PathPrefix = PathPrefix("/api");

impl utoipa::Modify for PathPrefix {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let mut new_paths = BTreeMap::new();

        for (path, item) in std::mem::take(&mut openapi.paths.paths) {
            new_paths.insert(self.0.to_string() + path.as_ref(), item);
        }

        openapi.paths.paths = new_paths;
    }
}

pub fn auth_routes() -> Vec<Route> {
    routes![login, change_password]
}

pub fn profile_routes() -> Vec<Route> {
    routes![student_profile, personal_details, parent_details]
}

pub fn student_routes() -> Vec<Route> {
    routes![
        student_details,
        total_credits,
        current_cgpa,
        courses_registered,
        courses_completed,
        attendance,
        upcoming_exam,
        calendar
    ]
}

pub fn assignment_routes() -> Vec<Route> {
    routes![
        assignment_list,
        assignment_preview,
        assignment_full,
        assignment_submit,
        assignment_submissions
    ]
}

pub fn upload_routes() -> Vec<Route> {
    routes![upload_document, upload_profile_picture]
}

#[get("/")]
pub fn welcome() -> &'static str {
    "Welcome to the student portal API."
}

/// Renders errors that never reached a handler as problem documents.
#[catch(default)]
pub fn default_catcher(status: Status, req: &Request) -> Problem {
    tracing::debug!("{} {} failed with {}", req.method(), req.uri(), status);

    if let Some(problem) = GuardProblem::of(req).filter(|it| it.status == status) {
        return problem.clone();
    }

    let title = match status.code {
        401 => "Authentication required.",
        403 => "Access denied.",
        404 => "Resource not found.",
        413 => "Upload too large.",
        422 => "Malformed request body.",
        500 => "Internal server error.",
        _ => status.reason().unwrap_or("Request failed."),
    };

    Problem::new_untyped(status, title)
}

pub fn mount_api(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .mount("/api/auth", auth_routes())
        .mount("/api/profile", profile_routes())
        .mount("/api/students", student_routes())
        .mount("/api", assignment_routes())
        .mount("/api/uploads", upload_routes())
        .mount(
            "/",
            SwaggerUi::new("/swagger/<_..>").url("/api/openapi.json", ApiDoc::openapi()),
        )
        .mount("/", routes![welcome])
        .register("/", catchers![default_catcher])
}

/// In-process server pieces that don't need a reachable database.
#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use rocket::{Build, Rocket};

    use crate::config::Config;
    use crate::error::MediaError;
    use crate::media::{MediaStore, MediaUpload, StoredMedia};
    use crate::security::Security;

    pub const SECRET: &[u8] = b"an-unguessable-test-secret-of-decent-length";

    /// Media host stand-in that remembers every folder it was asked to store into.
    #[derive(Debug, Clone, Default)]
    pub struct RecordingMedia {
        pub folders: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingMedia {
        pub fn uploads(&self) -> Vec<String> {
            self.folders.lock().map(|it| it.clone()).unwrap_or_default()
        }
    }

    #[rocket::async_trait]
    impl MediaStore for RecordingMedia {
        async fn upload(&self, upload: MediaUpload) -> Result<StoredMedia, MediaError> {
            let mut folders = self.folders.lock().map_err(|_| MediaError::NotConfigured)?;
            folders.push(upload.folder.clone());
            let public_id = format!("{}/file-{}", upload.folder, folders.len());

            Ok(StoredMedia {
                url: format!("https://media.example.com/{}", public_id),
                public_id,
            })
        }
    }

    /// The API with its managed state. The database handle never connects
    /// unless a request reaches a query.
    pub async fn offline_api(media: RecordingMedia) -> Rocket<Build> {
        let client = mongodb::Client::with_uri_str(
            "mongodb://127.0.0.1:9/?serverSelectionTimeoutMS=200&connectTimeoutMS=200",
        )
        .await
        .expect("uri parses");
        let media: Box<dyn MediaStore> = Box::new(media);

        super::mount_api(
            rocket::build()
                .manage(Config::default())
                .manage(Security::from_secret(SECRET))
                .manage(client.database("campus_portal_offline"))
                .manage(media),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_paths_carry_prefix() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();

        for expected in [
            "/api/auth/login",
            "/api/auth/change-password",
            "/api/profile/student",
            "/api/students/attendance",
            "/api/assignments/{id}/submit",
            "/api/uploads/document",
        ] {
            assert!(
                paths.iter().any(|it| it.as_str() == expected),
                "missing {} in {:?}",
                expected,
                paths
            );
        }
    }

    #[rocket::async_test]
    async fn guard_problems_reach_the_client() {
        use rocket::http::{Header, Status};
        use rocket::local::asynchronous::Client;

        use crate::resp::jwt::AUTH_HEADER_NAME;

        let client = Client::tracked(testing::offline_api(Default::default()).await)
            .await
            .expect("valid rocket");

        let missing = client.get("/api/students/details").dispatch().await;
        assert_eq!(missing.status(), Status::Unauthorized);
        let body: serde_json::Value = missing.into_json().await.expect("problem body");
        assert_eq!(body["title"], "No token provided");
        assert_eq!(body["status"], 401);

        let forged = client
            .get("/api/profile/student")
            .header(Header::new(AUTH_HEADER_NAME, "Bearer not.a.token"))
            .dispatch()
            .await;
        assert_eq!(forged.status(), Status::Forbidden);
        let body: serde_json::Value = forged.into_json().await.expect("problem body");
        assert_eq!(body["title"], "Invalid Token");
    }

    #[rocket::async_test]
    async fn unmatched_paths_get_generic_problems() {
        use rocket::http::Status;
        use rocket::local::asynchronous::Client;

        let client = Client::tracked(testing::offline_api(Default::default()).await)
            .await
            .expect("valid rocket");

        let response = client.get("/api/nothing-here").dispatch().await;
        assert_eq!(response.status(), Status::NotFound);
        let body: serde_json::Value = response.into_json().await.expect("problem body");
        assert_eq!(body["title"], "Resource not found.");
    }

    #[test]
    fn bearer_scheme_is_documented() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("jwt"));
    }
}
