//! Academic calendar, semester windows and attendance.
//!
//! A student's current semester selects both a cohort year (which column of
//! the calendar applies to them) and a semester record (which date range
//! attendance is measured over).

use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use rocket::http::Status;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use utoipa::ToSchema;

use crate::resp::problem::Problem;

pub mod db;

pub static ACADEMIC_YEAR_COLLECTION_NAME: &str = "academicyears";
pub static CALENDAR_COLLECTION_NAME: &str = "calendars";
pub static ATTENDANCE_COLLECTION_NAME: &str = "attendances";

#[derive(Debug, Clone, Copy, Eq, PartialEq, Error)]
#[error("invalid semester number: {0}")]
pub struct InvalidSemester(pub i64);

impl From<InvalidSemester> for Problem {
    fn from(e: InvalidSemester) -> Self {
        Problem::new_untyped(
            Status::BadRequest,
            "Could not determine academic year for the current semester.",
        )
        .detail(e)
        .clone()
    }
}

/// Year-of-study bucket a semester belongs to.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum CohortYear {
    FirstYear,
    SecondYear,
    ThirdYear,
    FourthYear,
}

impl CohortYear {
    pub const ALL: [CohortYear; 4] = [
        CohortYear::FirstYear,
        CohortYear::SecondYear,
        CohortYear::ThirdYear,
        CohortYear::FourthYear,
    ];

    pub fn from_semester(semester: i64) -> Result<CohortYear, InvalidSemester> {
        match semester {
            1 | 2 => Ok(CohortYear::FirstYear),
            3 | 4 => Ok(CohortYear::SecondYear),
            5 | 6 => Ok(CohortYear::ThirdYear),
            7 | 8 => Ok(CohortYear::FourthYear),
            other => Err(InvalidSemester(other)),
        }
    }

    /// Name of this cohort's column in calendar documents.
    pub fn calendar_key(self) -> &'static str {
        match self {
            CohortYear::FirstYear => "firstYear",
            CohortYear::SecondYear => "secondYear",
            CohortYear::ThirdYear => "thirdYear",
            CohortYear::FourthYear => "fourthYear",
        }
    }
}

/// Classification of a calendar day for one cohort.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Default, ToSchema)]
pub enum DayType {
    #[default]
    WorkingDay,
    Holiday,
    Weekend,
    ExamDay,
    Vacation,
    ClassTest(u8),
    MidTerm(u8),
    SemesterEndExams,
    Other(String),
}

impl DayType {
    pub fn as_str(&self) -> std::borrow::Cow<'static, str> {
        use std::borrow::Cow;
        match self {
            DayType::WorkingDay => Cow::Borrowed("Working Day"),
            DayType::Holiday => Cow::Borrowed("Holiday"),
            DayType::Weekend => Cow::Borrowed("Weekend"),
            DayType::ExamDay => Cow::Borrowed("Exam Day"),
            DayType::Vacation => Cow::Borrowed("Vacation"),
            DayType::ClassTest(n) => Cow::Owned(format!("CT-{}", n)),
            DayType::MidTerm(n) => Cow::Owned(format!("MID-{}", n)),
            DayType::SemesterEndExams => Cow::Borrowed("SEM-END-EXAMS"),
            DayType::Other(it) => Cow::Owned(it.clone()),
        }
    }

    /// Stored values that count as a working day.
    pub fn working_values() -> [&'static str; 2] {
        ["Working Day", "Working"]
    }

    /// Whether this day is one of the scheduled exam kinds.
    pub fn is_exam(&self) -> bool {
        matches!(
            self,
            DayType::ClassTest(1..=4) | DayType::MidTerm(1..=2) | DayType::SemesterEndExams
        )
    }
}

impl From<&str> for DayType {
    fn from(value: &str) -> Self {
        match value {
            "Working Day" | "Working" => DayType::WorkingDay,
            "Holiday" => DayType::Holiday,
            "Weekend" => DayType::Weekend,
            "Exam Day" => DayType::ExamDay,
            "Vacation" => DayType::Vacation,
            "SEM-END-EXAMS" => DayType::SemesterEndExams,
            other => {
                let numbered = |prefix: &str| {
                    other
                        .strip_prefix(prefix)
                        .and_then(|n| n.parse::<u8>().ok())
                };
                if let Some(n) = numbered("CT-") {
                    DayType::ClassTest(n)
                } else if let Some(n) = numbered("MID-") {
                    DayType::MidTerm(n)
                } else {
                    DayType::Other(other.to_string())
                }
            }
        }
    }
}

impl Serialize for DayType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_str())
    }
}

impl<'de> Deserialize<'de> for DayType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(DayType::from(value.as_str()))
    }
}

/// Per-cohort day classification of a single calendar date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayTypes {
    #[serde(default)]
    pub first_year: DayType,
    #[serde(default)]
    pub second_year: DayType,
    #[serde(default)]
    pub third_year: DayType,
    #[serde(default)]
    pub fourth_year: DayType,
}

impl DayTypes {
    pub fn get(&self, cohort: CohortYear) -> &DayType {
        match cohort {
            CohortYear::FirstYear => &self.first_year,
            CohortYear::SecondYear => &self.second_year,
            CohortYear::ThirdYear => &self.third_year,
            CohortYear::FourthYear => &self.fourth_year,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (CohortYear, &DayType)> {
        CohortYear::ALL.into_iter().map(move |it| (it, self.get(it)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarDay {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<ObjectId>,
    #[serde(default)]
    pub id: String,
    pub date: bson::DateTime,
    #[serde(rename = "type", default)]
    pub types: DayTypes,
    #[serde(default)]
    pub is_holiday: bool,
    #[serde(default)]
    pub holiday_reason: Option<String>,
}

/// Calendar day as seen by one cohort.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEntry {
    pub date_obj: DateTime<Utc>,
    pub id: String,
    #[serde(rename = "type")]
    #[schema(value_type = String)]
    pub day_type: DayType,
    pub is_holiday: bool,
    pub holiday_reason: Option<String>,
}

impl CalendarEntry {
    pub fn for_cohort(day: &CalendarDay, cohort: CohortYear) -> CalendarEntry {
        CalendarEntry {
            date_obj: day.date.to_chrono(),
            id: day.id.clone(),
            day_type: day.types.get(cohort).clone(),
            is_holiday: day.is_holiday,
            holiday_reason: day.holiday_reason.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NearestExam {
    pub date: DateTime<Utc>,
    #[schema(value_type = String)]
    pub exam_type: DayType,
    pub academic_year: CohortYear,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NearestExamResponse {
    pub message: String,
    pub nearest_exam: NearestExam,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CalendarResponse {
    pub message: String,
    pub calendar_details: Vec<CalendarEntry>,
}

/// Earliest exam day for `cohort` among `days`, regardless of input order.
pub fn nearest_exam<'a>(
    days: impl IntoIterator<Item = &'a CalendarDay>,
    cohort: CohortYear,
) -> Option<NearestExam> {
    let mut exams: Vec<NearestExam> = days
        .into_iter()
        .filter(|day| !day.is_holiday)
        .flat_map(|day| day.types.iter().map(move |(c, t)| (day.date, c, t)))
        .filter(|(_, c, t)| *c == cohort && t.is_exam())
        .map(|(date, c, t)| NearestExam {
            date: date.to_chrono(),
            exam_type: t.clone(),
            academic_year: c,
        })
        .collect();

    exams.sort_by_key(|it| it.date);
    exams.into_iter().next()
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum EndDateStatus {
    Completed,
    #[default]
    Pending,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterRecord {
    pub semester_name: String,
    #[serde(default)]
    pub academic_start_date: Option<bson::DateTime>,
    #[serde(default)]
    pub academic_end_date: Option<bson::DateTime>,
    #[serde(default)]
    pub end_date_status: EndDateStatus,
}

pub fn semester_name(semester: i64) -> String {
    format!("Semester {}", semester)
}

impl SemesterRecord {
    /// Date range attendance is measured over. A semester that isn't marked
    /// completed with a recorded end date is still running, so it ends `now`.
    pub fn window(&self, now: DateTime<Utc>) -> Option<SemesterWindow> {
        let start = self.academic_start_date?.to_chrono();

        let end = match (self.end_date_status, self.academic_end_date) {
            (EndDateStatus::Completed, Some(end)) => end.to_chrono(),
            _ => now,
        };

        Some(SemesterWindow { start, end })
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct SemesterWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcademicYearInfo {
    pub year_number: i32,
    pub year_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcademicYear {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub academic_year: AcademicYearInfo,
    #[serde(default)]
    pub semesters: Vec<SemesterRecord>,
}

impl AcademicYear {
    pub fn semester(&self, name: &str) -> Option<&SemesterRecord> {
        self.semesters.iter().find(|it| it.semester_name == name)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum AttendanceMark {
    Present,
    Absent,
    Late,
    Excused,
    Holiday,
    Cancelled,
}

impl AttendanceMark {
    pub const ATTENDED: [AttendanceMark; 2] = [AttendanceMark::Present, AttendanceMark::Late];

    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceMark::Present => "Present",
            AttendanceMark::Absent => "Absent",
            AttendanceMark::Late => "Late",
            AttendanceMark::Excused => "Excused",
            AttendanceMark::Holiday => "Holiday",
            AttendanceMark::Cancelled => "Cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub associate_id: String,
    pub attendance_date: bson::DateTime,
    pub attendance_mark: AttendanceMark,
    #[serde(rename = "markedByFacultyId", default)]
    pub marked_by_faculty_id: Option<ObjectId>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct AttendanceSummary {
    pub attended_days: u64,
    pub working_days: u64,
}

impl AttendanceSummary {
    pub fn new(attended_days: u64, working_days: u64) -> AttendanceSummary {
        AttendanceSummary {
            attended_days,
            working_days,
        }
    }

    pub fn percentage(&self) -> f64 {
        if self.working_days == 0 {
            return 0.0;
        }
        self.attended_days as f64 / self.working_days as f64 * 100.0
    }

    /// Percentage with two decimals, e.g. `"90.00"`.
    pub fn percentage_text(&self) -> String {
        format!("{:.2}", self.percentage())
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceResponse {
    pub message: String,
    pub student_associate_id: String,
    pub current_semester: i64,
    pub academic_start_date: DateTime<Utc>,
    pub calculation_end_date: DateTime<Utc>,
    pub attendance_records_count: u64,
    pub total_working_days: u64,
    pub attendance_percentage: String,
}
