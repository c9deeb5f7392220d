use bson::oid::ObjectId;
use bson::{doc, Document};
use mongodb::{Collection, Database};
use rocket::futures::TryStreamExt;

use super::*;

fn course_lookup() -> [Document; 2] {
    [
        doc! {
            "$lookup": {
                "from": COURSE_COLLECTION_NAME,
                "localField": "courseId",
                "foreignField": "_id",
                "as": "course",
            }
        },
        doc! { "$unwind": "$course" },
    ]
}

pub trait CourseDbExt {
    fn courses(&self) -> Collection<Course>;
    fn faculty(&self) -> Collection<Faculty>;
    fn enrollments(&self) -> Collection<Enrollment>;
    fn marks(&self) -> Collection<Mark>;

    async fn final_marks(&self, student_id: ObjectId) -> mongodb::error::Result<Vec<Mark>>;
    async fn registered_courses(
        &self,
        student_id: ObjectId,
    ) -> mongodb::error::Result<Vec<RegisteredCourse>>;
    async fn completed_courses(
        &self,
        student_id: ObjectId,
    ) -> mongodb::error::Result<Vec<CompletedCourse>>;
}

impl CourseDbExt for Database {
    fn courses(&self) -> Collection<Course> {
        self.collection(COURSE_COLLECTION_NAME)
    }

    fn faculty(&self) -> Collection<Faculty> {
        self.collection(FACULTY_COLLECTION_NAME)
    }

    fn enrollments(&self) -> Collection<Enrollment> {
        self.collection(ENROLLMENT_COLLECTION_NAME)
    }

    fn marks(&self) -> Collection<Mark> {
        self.collection(MARK_COLLECTION_NAME)
    }

    async fn final_marks(&self, student_id: ObjectId) -> mongodb::error::Result<Vec<Mark>> {
        self.marks()
            .find(doc! { "studentId": student_id, "gradeStatus": "Final" }, None)
            .await?
            .try_collect()
            .await
    }

    async fn registered_courses(
        &self,
        student_id: ObjectId,
    ) -> mongodb::error::Result<Vec<RegisteredCourse>> {
        let mut pipeline = vec![doc! {
            "$match": {
                "studentId": student_id,
                "status": EnrollmentStatus::Enrolled.as_str(),
            }
        }];
        pipeline.extend(course_lookup());
        pipeline.push(doc! {
            "$project": {
                "_id": 0,
                "courseId": "$course._id",
                "courseCode": "$course.courseCode",
                "courseName": "$course.courseName",
                "credits": "$course.credits",
                "academicYear": 1,
                "semester": 1,
                "enrollmentDate": 1,
                "status": 1,
            }
        });

        let rows: Vec<Document> = self
            .enrollments()
            .aggregate(pipeline, None)
            .await?
            .try_collect()
            .await?;

        rows.into_iter()
            .map(|it| bson::from_document(it).map_err(mongodb::error::Error::from))
            .collect()
    }

    async fn completed_courses(
        &self,
        student_id: ObjectId,
    ) -> mongodb::error::Result<Vec<CompletedCourse>> {
        let mut pipeline = vec![doc! {
            "$match": {
                "studentId": student_id,
                "status": EnrollmentStatus::Completed.as_str(),
            }
        }];
        pipeline.extend(course_lookup());
        pipeline.extend([
            doc! {
                "$lookup": {
                    "from": MARK_COLLECTION_NAME,
                    "localField": "_id",
                    "foreignField": "enrollmentId",
                    "as": "mark",
                }
            },
            doc! { "$unwind": { "path": "$mark", "preserveNullAndEmptyArrays": true } },
            doc! {
                "$project": {
                    "_id": 0,
                    "courseId": "$course._id",
                    "courseCode": "$course.courseCode",
                    "courseName": "$course.courseName",
                    "credits": "$course.credits",
                    "academicYear": 1,
                    "semester": 1,
                    "letterGrade": "$mark.letterGrade",
                    "gradePoint": "$mark.gradePoint",
                    "creditsGained": "$mark.creditsGained",
                }
            },
            doc! { "$sort": { "academicYear": 1, "semester": 1, "courseCode": 1 } },
        ]);

        let rows: Vec<Document> = self
            .enrollments()
            .aggregate(pipeline, None)
            .await?
            .try_collect()
            .await?;

        rows.into_iter()
            .map(|it| bson::from_document(it).map_err(mongodb::error::Error::from))
            .collect()
    }
}
