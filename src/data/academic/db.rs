use bson::{doc, Document};
use chrono::{DateTime, Utc};
use mongodb::options::{FindOptions, IndexOptions};
use mongodb::{Collection, Database, IndexModel};
use rocket::futures::TryStreamExt;

use super::*;

pub mod problem {
    use crate::resp::problem::Problem;
    use rocket::http::Status;

    #[inline]
    pub fn semester_not_found() -> Problem {
        Problem::new_untyped(
            Status::NotFound,
            "Semester start or end date could not be determined.",
        )
    }

    #[inline]
    pub fn no_upcoming_exam() -> Problem {
        Problem::new_untyped(
            Status::NotFound,
            "No upcoming exams found for this academic year.",
        )
    }
}

fn date_range(window: &SemesterWindow) -> Document {
    doc! {
        "$gte": bson::DateTime::from_chrono(window.start),
        "$lte": bson::DateTime::from_chrono(window.end),
    }
}

/// Attendance marks of one student that count as attended inside `window`.
pub fn attended_days_filter(associate_id: &str, window: &SemesterWindow) -> Document {
    let attended: Vec<&str> = AttendanceMark::ATTENDED
        .iter()
        .map(|it| it.as_str())
        .collect();

    doc! {
        "associate_id": associate_id,
        "attendance_date": date_range(window),
        "attendance_mark": { "$in": attended },
    }
}

/// Calendar days inside `window` that are working days for `cohort`.
pub fn working_days_filter(cohort: CohortYear, window: &SemesterWindow) -> Document {
    let column = format!("type.{}", cohort.calendar_key());

    doc! {
        "date": date_range(window),
        column: { "$in": DayType::working_values().to_vec() },
    }
}

pub trait AcademicDbExt {
    fn academic_years(&self) -> Collection<AcademicYear>;
    fn calendar_days(&self) -> Collection<CalendarDay>;
    fn attendances(&self) -> Collection<AttendanceRecord>;

    async fn find_semester(&self, semester: i64) -> mongodb::error::Result<Option<SemesterRecord>>;

    async fn count_attended_days(
        &self,
        associate_id: &str,
        window: &SemesterWindow,
    ) -> mongodb::error::Result<u64>;
    async fn count_working_days(
        &self,
        cohort: CohortYear,
        window: &SemesterWindow,
    ) -> mongodb::error::Result<u64>;

    async fn upcoming_calendar_days(
        &self,
        from: DateTime<Utc>,
    ) -> mongodb::error::Result<Vec<CalendarDay>>;
    async fn calendar_days_from(
        &self,
        start: DateTime<Utc>,
    ) -> mongodb::error::Result<Vec<CalendarDay>>;

    async fn ensure_indexes(&self) -> mongodb::error::Result<()>;
}

impl AcademicDbExt for Database {
    fn academic_years(&self) -> Collection<AcademicYear> {
        self.collection(ACADEMIC_YEAR_COLLECTION_NAME)
    }

    fn calendar_days(&self) -> Collection<CalendarDay> {
        self.collection(CALENDAR_COLLECTION_NAME)
    }

    fn attendances(&self) -> Collection<AttendanceRecord> {
        self.collection(ATTENDANCE_COLLECTION_NAME)
    }

    async fn find_semester(&self, semester: i64) -> mongodb::error::Result<Option<SemesterRecord>> {
        let name = semester_name(semester);
        let year = self
            .academic_years()
            .find_one(doc! { "semesters.semesterName": &name }, None)
            .await?;

        Ok(year.and_then(|it| it.semester(&name).cloned()))
    }

    async fn count_attended_days(
        &self,
        associate_id: &str,
        window: &SemesterWindow,
    ) -> mongodb::error::Result<u64> {
        self.attendances()
            .count_documents(attended_days_filter(associate_id, window), None)
            .await
    }

    async fn count_working_days(
        &self,
        cohort: CohortYear,
        window: &SemesterWindow,
    ) -> mongodb::error::Result<u64> {
        self.calendar_days()
            .count_documents(working_days_filter(cohort, window), None)
            .await
    }

    async fn upcoming_calendar_days(
        &self,
        from: DateTime<Utc>,
    ) -> mongodb::error::Result<Vec<CalendarDay>> {
        let options = FindOptions::builder().sort(doc! { "date": 1 }).build();

        self.calendar_days()
            .find(
                doc! {
                    "date": { "$gte": bson::DateTime::from_chrono(from) },
                    "isHoliday": false,
                },
                options,
            )
            .await?
            .try_collect()
            .await
    }

    async fn calendar_days_from(
        &self,
        start: DateTime<Utc>,
    ) -> mongodb::error::Result<Vec<CalendarDay>> {
        let options = FindOptions::builder().sort(doc! { "id": 1 }).build();

        self.calendar_days()
            .find(
                doc! { "date": { "$gte": bson::DateTime::from_chrono(start) } },
                options,
            )
            .await?
            .try_collect()
            .await
    }

    async fn ensure_indexes(&self) -> mongodb::error::Result<()> {
        let unique = || IndexOptions::builder().unique(true).build();

        self.attendances()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "associate_id": 1, "attendance_date": 1 })
                    .options(unique())
                    .build(),
                None,
            )
            .await?;

        self.calendar_days()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "date": 1 })
                    .options(unique())
                    .build(),
                None,
            )
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn window() -> SemesterWindow {
        SemesterWindow {
            start: Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 5, 31, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn working_days_accept_both_stored_spellings() {
        let filter = working_days_filter(CohortYear::ThirdYear, &window());

        let accepted = filter
            .get_document("type.thirdYear")
            .expect("filters on the cohort's column")
            .get_array("$in")
            .expect("$in list");
        let accepted: Vec<&str> = accepted.iter().filter_map(|it| it.as_str()).collect();
        assert_eq!(accepted, vec!["Working Day", "Working"]);

        let range = filter.get_document("date").unwrap();
        assert_eq!(
            range.get_datetime("$gte").unwrap(),
            &bson::DateTime::from_chrono(window().start)
        );
        assert_eq!(
            range.get_datetime("$lte").unwrap(),
            &bson::DateTime::from_chrono(window().end)
        );
    }

    #[test]
    fn only_present_and_late_count_as_attended() {
        let filter = attended_days_filter("238T1A4252", &window());

        assert_eq!(filter.get_str("associate_id").unwrap(), "238T1A4252");
        let marks: Vec<&str> = filter
            .get_document("attendance_mark")
            .unwrap()
            .get_array("$in")
            .unwrap()
            .iter()
            .filter_map(|it| it.as_str())
            .collect();
        assert_eq!(marks, vec!["Present", "Late"]);
    }
}
