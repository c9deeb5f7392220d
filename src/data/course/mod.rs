use bson::oid::ObjectId;
use bson::serde_helpers::serialize_object_id_as_hex_string;
use chrono::{DateTime, Utc};
use utoipa::ToSchema;

use crate::util::{bson_date_opt, round2};

pub mod db;

pub static COURSE_COLLECTION_NAME: &str = "courses";
pub static FACULTY_COLLECTION_NAME: &str = "faculty";
pub static ENROLLMENT_COLLECTION_NAME: &str = "enrollments";
pub static MARK_COLLECTION_NAME: &str = "marks";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub course_code: String,
    pub course_name: String,
    #[serde(default)]
    pub description: String,
    pub credits: f64,
    #[serde(default)]
    pub department: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Faculty {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub faculty_id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub designation: String,
}

impl Faculty {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
pub enum EnrollmentStatus {
    #[default]
    Enrolled,
    Dropped,
    Completed,
    Waitlisted,
    Pending,
}

impl EnrollmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EnrollmentStatus::Enrolled => "Enrolled",
            EnrollmentStatus::Dropped => "Dropped",
            EnrollmentStatus::Completed => "Completed",
            EnrollmentStatus::Waitlisted => "Waitlisted",
            EnrollmentStatus::Pending => "Pending",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub student_id: ObjectId,
    pub course_id: ObjectId,
    pub faculty_id: ObjectId,
    pub academic_year: String,
    pub semester: String,
    #[serde(default)]
    pub enrollment_date: Option<bson::DateTime>,
    #[serde(default)]
    pub status: EnrollmentStatus,
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum GradeStatus {
    Final,
    Provisional,
    #[default]
    Pending,
    Incomplete,
    Withdrawn,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mark {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub enrollment_id: ObjectId,
    pub student_id: ObjectId,
    pub course_id: ObjectId,
    #[serde(default)]
    pub academic_year: String,
    #[serde(default)]
    pub semester: String,
    #[serde(default)]
    pub grade_point: Option<f64>,
    #[serde(default)]
    pub letter_grade: Option<String>,
    #[serde(default)]
    pub credits_gained: f64,
    #[serde(default)]
    pub grade_status: GradeStatus,
}

/// Credit and grade-point totals over a student's final marks.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GradeSummary {
    pub total_credits: f64,
    pub cgpa: f64,
}

impl GradeSummary {
    pub fn from_marks<'a>(marks: impl IntoIterator<Item = &'a Mark>) -> GradeSummary {
        let mut total_credits = 0.0;
        let mut point_sum = 0.0;
        let mut graded = 0usize;

        for mark in marks
            .into_iter()
            .filter(|it| it.grade_status == GradeStatus::Final)
        {
            total_credits += mark.credits_gained;
            if let Some(point) = mark.grade_point {
                point_sum += point;
                graded += 1;
            }
        }

        let cgpa = if graded == 0 {
            0.0
        } else {
            round2(point_sum / graded as f64)
        };

        GradeSummary { total_credits, cgpa }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TotalCreditsResponse {
    #[serde(serialize_with = "serialize_object_id_as_hex_string")]
    #[schema(value_type = String)]
    pub student_id: ObjectId,
    pub total_credits: f64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CgpaResponse {
    #[serde(serialize_with = "serialize_object_id_as_hex_string")]
    #[schema(value_type = String)]
    pub student_id: ObjectId,
    pub cgpa: f64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredCourse {
    #[serde(serialize_with = "serialize_object_id_as_hex_string")]
    #[schema(value_type = String)]
    pub course_id: ObjectId,
    pub course_code: String,
    pub course_name: String,
    pub credits: f64,
    pub academic_year: String,
    pub semester: String,
    #[serde(default, with = "bson_date_opt")]
    pub enrollment_date: Option<DateTime<Utc>>,
    pub status: EnrollmentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompletedCourse {
    #[serde(serialize_with = "serialize_object_id_as_hex_string")]
    #[schema(value_type = String)]
    pub course_id: ObjectId,
    pub course_code: String,
    pub course_name: String,
    pub credits: f64,
    pub academic_year: String,
    pub semester: String,
    #[serde(default)]
    pub letter_grade: Option<String>,
    #[serde(default)]
    pub grade_point: Option<f64>,
    #[serde(default)]
    pub credits_gained: Option<f64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredCourses {
    #[serde(serialize_with = "serialize_object_id_as_hex_string")]
    #[schema(value_type = String)]
    pub student_id: ObjectId,
    pub courses: Vec<RegisteredCourse>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompletedCourses {
    #[serde(serialize_with = "serialize_object_id_as_hex_string")]
    #[schema(value_type = String)]
    pub student_id: ObjectId,
    pub courses: Vec<CompletedCourse>,
    pub message: String,
}
