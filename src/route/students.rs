use chrono::Utc;
use mongodb::Database;
use rocket::serde::json::Json;
use rocket::State;

use crate::data::academic::db::problem as academic_problem;
use crate::data::academic::db::AcademicDbExt;
use crate::data::academic::{
    nearest_exam, AttendanceResponse, AttendanceSummary, CalendarEntry, CalendarResponse,
    CohortYear, NearestExamResponse, SemesterWindow,
};
use crate::data::course::db::CourseDbExt;
use crate::data::course::{
    CgpaResponse, CompletedCourses, GradeSummary, RegisteredCourses, TotalCreditsResponse,
};
use crate::data::student::db::StudentDbExt;
use crate::data::student::{Student, StudentDetails, StudentDetailsResponse};
use crate::resp::jwt::StudentAuth;
use crate::resp::problem::Problem;
use crate::util::start_of_day;

/// Current semester of `student` with the date range it spans so far.
async fn current_window(
    db: &Database,
    student: &Student,
) -> Result<SemesterWindow, Problem> {
    db.find_semester(student.current_semester)
        .await?
        .and_then(|semester| semester.window(Utc::now()))
        .ok_or_else(academic_problem::semester_not_found)
}

#[utoipa::path(
    context_path = "/students",
    responses(
        (status = 200, description = "Account and student record", body = StudentDetailsResponse),
        (status = 403, description = "Not a student account", body = Problem),
        (status = 404, description = "Student not found", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/details")]
#[tracing::instrument(skip(db))]
pub async fn student_details(
    auth: StudentAuth,
    db: &State<Database>,
) -> Result<Json<StudentDetailsResponse>, Problem> {
    let student = db.require_student(auth.student_id).await?;

    Ok(Json(StudentDetailsResponse {
        student_details: StudentDetails::new(&auth.user, student),
        message: "Student details fetched successfully.".to_string(),
    }))
}

#[utoipa::path(
    context_path = "/students",
    responses(
        (status = 200, description = "Credits earned over final grades", body = TotalCreditsResponse),
    ),
    security(("jwt" = []))
)]
#[get("/total-credits")]
#[tracing::instrument(skip(db))]
pub async fn total_credits(
    auth: StudentAuth,
    db: &State<Database>,
) -> Result<Json<TotalCreditsResponse>, Problem> {
    let marks = db.final_marks(auth.student_id).await?;
    let summary = GradeSummary::from_marks(&marks);

    Ok(Json(TotalCreditsResponse {
        student_id: auth.student_id,
        total_credits: summary.total_credits,
        message: "Total credits fetched successfully.".to_string(),
    }))
}

#[utoipa::path(
    context_path = "/students",
    responses(
        (status = 200, description = "Mean grade point over final grades", body = CgpaResponse),
    ),
    security(("jwt" = []))
)]
#[get("/current-cgpa")]
#[tracing::instrument(skip(db))]
pub async fn current_cgpa(
    auth: StudentAuth,
    db: &State<Database>,
) -> Result<Json<CgpaResponse>, Problem> {
    let marks = db.final_marks(auth.student_id).await?;
    let summary = GradeSummary::from_marks(&marks);

    Ok(Json(CgpaResponse {
        student_id: auth.student_id,
        cgpa: summary.cgpa,
        message: "CGPA calculated successfully.".to_string(),
    }))
}

#[utoipa::path(
    context_path = "/students",
    responses(
        (status = 200, description = "Courses the student is enrolled in", body = RegisteredCourses),
    ),
    security(("jwt" = []))
)]
#[get("/courses-registered")]
#[tracing::instrument(skip(db))]
pub async fn courses_registered(
    auth: StudentAuth,
    db: &State<Database>,
) -> Result<Json<RegisteredCourses>, Problem> {
    let courses = db.registered_courses(auth.student_id).await?;

    Ok(Json(RegisteredCourses {
        student_id: auth.student_id,
        courses,
        message: "Registered courses fetched successfully.".to_string(),
    }))
}

#[utoipa::path(
    context_path = "/students",
    responses(
        (status = 200, description = "Completed courses with grades", body = CompletedCourses),
    ),
    security(("jwt" = []))
)]
#[get("/courses-completed")]
#[tracing::instrument(skip(db))]
pub async fn courses_completed(
    auth: StudentAuth,
    db: &State<Database>,
) -> Result<Json<CompletedCourses>, Problem> {
    let courses = db.completed_courses(auth.student_id).await?;

    Ok(Json(CompletedCourses {
        student_id: auth.student_id,
        courses,
        message: "Completed courses fetched successfully.".to_string(),
    }))
}

#[utoipa::path(
    context_path = "/students",
    responses(
        (status = 200, description = "Attendance over the current semester", body = AttendanceResponse),
        (status = 400, description = "Semester can't be mapped to a year", body = Problem),
        (status = 404, description = "Semester dates unknown", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/attendance")]
#[tracing::instrument(skip(db))]
pub async fn attendance(
    auth: StudentAuth,
    db: &State<Database>,
) -> Result<Json<AttendanceResponse>, Problem> {
    let student = db.require_student(auth.student_id).await?;
    let cohort = CohortYear::from_semester(student.current_semester)?;
    let window = current_window(db, &student).await?;

    let attended = db.count_attended_days(&student.student_id, &window).await?;
    let working = db.count_working_days(cohort, &window).await?;
    let summary = AttendanceSummary::new(attended, working);
    tracing::debug!(
        "{} attended {} of {} working days",
        student.student_id,
        attended,
        working
    );

    Ok(Json(AttendanceResponse {
        message: "Attendance calculated successfully.".to_string(),
        student_associate_id: student.student_id,
        current_semester: student.current_semester,
        academic_start_date: window.start,
        calculation_end_date: window.end,
        attendance_records_count: attended,
        total_working_days: working,
        attendance_percentage: summary.percentage_text(),
    }))
}

#[utoipa::path(
    context_path = "/students",
    responses(
        (status = 200, description = "Next exam for the student's year", body = NearestExamResponse),
        (status = 404, description = "No upcoming exam", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/nearest-exam")]
#[tracing::instrument(skip(db))]
pub async fn upcoming_exam(
    auth: StudentAuth,
    db: &State<Database>,
) -> Result<Json<NearestExamResponse>, Problem> {
    let student = db.require_student(auth.student_id).await?;
    let cohort = CohortYear::from_semester(student.current_semester)?;

    let days = db.upcoming_calendar_days(start_of_day(Utc::now())).await?;
    let exam = nearest_exam(&days, cohort).ok_or_else(academic_problem::no_upcoming_exam)?;

    Ok(Json(NearestExamResponse {
        message: "Nearest exam fetched successfully.".to_string(),
        nearest_exam: exam,
    }))
}

#[utoipa::path(
    context_path = "/students",
    responses(
        (status = 200, description = "Calendar of the current semester", body = CalendarResponse),
        (status = 404, description = "Semester dates unknown", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/calendar")]
#[tracing::instrument(skip(db))]
pub async fn calendar(
    auth: StudentAuth,
    db: &State<Database>,
) -> Result<Json<CalendarResponse>, Problem> {
    let student = db.require_student(auth.student_id).await?;
    let cohort = CohortYear::from_semester(student.current_semester)?;
    let window = current_window(db, &student).await?;

    let calendar_details = db
        .calendar_days_from(window.start)
        .await?
        .iter()
        .map(|day| CalendarEntry::for_cohort(day, cohort))
        .collect();

    Ok(Json(CalendarResponse {
        message: "Calendar fetched successfully.".to_string(),
        calendar_details,
    }))
}

#[cfg(test)]
mod student_endpoints {
    use bson::{doc, Document};
    use chrono::{Duration, TimeZone, Utc};
    use mongodb::Database;
    use rocket::http::{Header, Status};
    use rocket::local::asynchronous::Client;

    use crate::config::Config;
    use crate::data::academic::db::AcademicDbExt;
    use crate::data::academic::{
        semester_name, AcademicYear, AcademicYearInfo, AttendanceMark, AttendanceRecord,
        EndDateStatus, SemesterRecord, CALENDAR_COLLECTION_NAME,
    };
    use crate::data::student::db::StudentDbExt;
    use crate::data::student::Student;
    use crate::data::user::db::UserDbExt;
    use crate::data::user::{PasswordHash, User, UserStatus};
    use crate::resp::jwt::{AuthToken, AUTH_HEADER_NAME};
    use crate::role::{AssociatedCollection, Role};
    use crate::security::Security;

    struct Fixture {
        user: User,
        student: Student,
        token: String,
    }

    async fn student_fixture(client: &Client, associate_id: &str, semester: i64) -> Fixture {
        let db: &Database = client.rocket().state().unwrap();
        let security: &Security = client.rocket().state().unwrap();
        let config: &Config = client.rocket().state().unwrap();

        let student: Student = bson::from_document(doc! {
            "_id": bson::oid::ObjectId::new(),
            "studentId": associate_id,
            "firstName": "Test",
            "currentSemester": semester,
        })
        .expect("student document");
        db.students().insert_one(&student, None).await.unwrap();

        let user = User {
            id: bson::oid::ObjectId::new(),
            username: associate_id.to_string(),
            email: format!("{}@example.com", associate_id),
            password_hash: PasswordHash::new("student-password", 4),
            password_version: 1,
            role: Role::Student,
            associated_id: Some(student.id),
            associated_collection: Some(AssociatedCollection::Students),
            status: UserStatus::Active,
            last_login: None,
        };
        db.users().insert_one(&user, None).await.unwrap();

        let token = AuthToken::new(&user, config.token_lifetime())
            .encode_jwt(&security.jwt_secret)
            .unwrap();

        Fixture { user, student, token }
    }

    async fn cleanup(db: &Database, fixture: &Fixture) {
        db.users().delete_one(doc! { "_id": fixture.user.id }, None).await.unwrap();
        db.students().delete_one(doc! { "_id": fixture.student.id }, None).await.unwrap();
    }

    fn bearer(token: &str) -> Header<'static> {
        Header::new(AUTH_HEADER_NAME, format!("Bearer {}", token))
    }

    #[rocket::async_test]
    #[ignore = "requires a running MongoDB instance"]
    async fn attendance_counts_over_a_completed_semester() {
        let client = Client::tracked(crate::create(None).await.expect("backend should start"))
            .await
            .expect("invalid backend");
        let db: &Database = client.rocket().state().unwrap();
        let fixture = student_fixture(&client, "ATTEND0001", 7).await;

        let start = Utc.with_ymd_and_hms(1971, 3, 1, 0, 0, 0).unwrap();
        let end = start + Duration::days(3);

        // A completed semester only counts days up to its recorded end.
        let year = AcademicYear {
            id: bson::oid::ObjectId::new(),
            academic_year: AcademicYearInfo {
                year_number: 4,
                year_name: "Fourth Year".to_string(),
            },
            semesters: vec![SemesterRecord {
                semester_name: semester_name(7),
                academic_start_date: Some(bson::DateTime::from_chrono(start)),
                academic_end_date: Some(bson::DateTime::from_chrono(end)),
                end_date_status: EndDateStatus::Completed,
            }],
        };
        db.academic_years().insert_one(&year, None).await.unwrap();

        // Both stored spellings of a working day count; the day after `end` doesn't.
        let kinds = ["Working Day", "Working", "Holiday", "Working Day", "Working Day"];
        let days: Vec<Document> = kinds
            .iter()
            .enumerate()
            .map(|(offset, kind)| {
                doc! {
                    "id": format!("attendance-test-{}", offset),
                    "date": bson::DateTime::from_chrono(start + Duration::days(offset as i64)),
                    "type": {
                        "firstYear": "Working Day",
                        "secondYear": "Working Day",
                        "thirdYear": "Working Day",
                        "fourthYear": *kind,
                    },
                    "isHoliday": false,
                }
            })
            .collect();
        let calendar = db.collection::<Document>(CALENDAR_COLLECTION_NAME);
        calendar.insert_many(&days, None).await.unwrap();

        let marks = [
            AttendanceMark::Present,
            AttendanceMark::Late,
            AttendanceMark::Absent,
            AttendanceMark::Present,
            AttendanceMark::Present,
        ];
        let records: Vec<AttendanceRecord> = marks
            .iter()
            .enumerate()
            .map(|(offset, mark)| AttendanceRecord {
                id: None,
                associate_id: fixture.student.student_id.clone(),
                attendance_date: bson::DateTime::from_chrono(start + Duration::days(offset as i64)),
                attendance_mark: *mark,
                marked_by_faculty_id: None,
            })
            .collect();
        db.attendances().insert_many(&records, None).await.unwrap();

        let response = client
            .get("/api/students/attendance")
            .header(bearer(&fixture.token))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let body: serde_json::Value = response.into_json().await.unwrap();

        // Days 0..=3: present, late, absent, present. Working: days 0, 1 and 3.
        assert_eq!(body["studentAssociateId"], "ATTEND0001");
        assert_eq!(body["currentSemester"], 7);
        assert_eq!(body["attendanceRecordsCount"], 3);
        assert_eq!(body["totalWorkingDays"], 3);
        assert_eq!(body["attendancePercentage"], "100.00");

        calendar
            .delete_many(doc! { "id": { "$regex": "^attendance-test-" } }, None)
            .await
            .unwrap();
        db.attendances()
            .delete_many(doc! { "associate_id": &fixture.student.student_id }, None)
            .await
            .unwrap();
        db.academic_years().delete_one(doc! { "_id": year.id }, None).await.unwrap();
        cleanup(db, &fixture).await;
    }

    #[rocket::async_test]
    #[ignore = "requires a running MongoDB instance"]
    async fn semester_without_start_date_is_not_found() {
        let client = Client::tracked(crate::create(None).await.expect("backend should start"))
            .await
            .expect("invalid backend");
        let db: &Database = client.rocket().state().unwrap();
        let fixture = student_fixture(&client, "NOSTART001", 1).await;

        let year = AcademicYear {
            id: bson::oid::ObjectId::new(),
            academic_year: AcademicYearInfo {
                year_number: 1,
                year_name: "First Year".to_string(),
            },
            semesters: vec![SemesterRecord {
                semester_name: semester_name(1),
                academic_start_date: None,
                academic_end_date: None,
                end_date_status: EndDateStatus::Pending,
            }],
        };
        db.academic_years().insert_one(&year, None).await.unwrap();

        let response = client
            .get("/api/students/attendance")
            .header(bearer(&fixture.token))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
        let body: serde_json::Value = response.into_json().await.unwrap();
        assert_eq!(body["title"], "Semester start or end date could not be determined.");

        db.academic_years().delete_one(doc! { "_id": year.id }, None).await.unwrap();
        cleanup(db, &fixture).await;
    }

    #[rocket::async_test]
    #[ignore = "requires a running MongoDB instance"]
    async fn semester_outside_any_year_is_rejected() {
        let client = Client::tracked(crate::create(None).await.expect("backend should start"))
            .await
            .expect("invalid backend");
        let db: &Database = client.rocket().state().unwrap();
        let fixture = student_fixture(&client, "BADSEM0001", 9).await;

        for path in ["/api/students/attendance", "/api/students/nearest-exam"] {
            let response = client.get(path).header(bearer(&fixture.token)).dispatch().await;
            assert_eq!(response.status(), Status::BadRequest, "{}", path);
        }

        cleanup(db, &fixture).await;
    }

    #[rocket::async_test]
    #[ignore = "requires a running MongoDB instance"]
    async fn details_include_account_fields() {
        let client = Client::tracked(crate::create(None).await.expect("backend should start"))
            .await
            .expect("invalid backend");
        let db: &Database = client.rocket().state().unwrap();
        let fixture = student_fixture(&client, "DETAIL0001", 3).await;

        let response = client
            .get("/api/students/details")
            .header(bearer(&fixture.token))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let body: serde_json::Value = response.into_json().await.unwrap();
        let details = &body["studentDetails"];
        assert_eq!(details["username"], "DETAIL0001");
        assert_eq!(details["role"], "student");
        assert_eq!(details["studentId"], "DETAIL0001");

        let credits = client
            .get("/api/students/total-credits")
            .header(bearer(&fixture.token))
            .dispatch()
            .await;
        let body: serde_json::Value = credits.into_json().await.unwrap();
        assert_eq!(body["totalCredits"], 0.0);

        cleanup(db, &fixture).await;
    }
}
