use bson::oid::ObjectId;
use bson::serde_helpers::serialize_object_id_as_hex_string;
use chrono::{DateTime, Utc};
use utoipa::ToSchema;

use crate::util::bson_number;

pub mod db;

pub static STUDENT_COLLECTION_NAME: &str = "students";

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
pub enum Gender {
    Male,
    Female,
    Other,
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
pub enum StudentStatus {
    #[default]
    Active,
    Graduated,
    Suspended,
    #[serde(rename = "On Leave")]
    OnLeave,
    #[serde(rename = "Dropped Out")]
    DroppedOut,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Contact {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub village: Option<String>,
    #[serde(default)]
    pub mandal: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub zip_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Parent {
    pub relation: String,
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub contact: Contact,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub student_id: String,
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<bson::DateTime>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub contact: Contact,
    #[serde(default)]
    pub address: Address,
    #[serde(default)]
    pub parents: Vec<Parent>,
    #[serde(default)]
    pub enrollment_date: Option<bson::DateTime>,
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub branchcode: Option<String>,
    #[serde(with = "bson_number")]
    pub current_semester: i64,
    #[serde(default)]
    pub status: StudentStatus,
    #[serde(default)]
    pub imageurl: Option<String>,
    #[serde(default)]
    pub updated_at: Option<bson::DateTime>,
}

fn to_chrono(value: Option<bson::DateTime>) -> Option<DateTime<Utc>> {
    value.map(|it| it.to_chrono())
}

/// Public-facing profile, without contact details or parents.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StudentProfile {
    #[serde(serialize_with = "serialize_object_id_as_hex_string")]
    #[schema(value_type = String)]
    pub id: ObjectId,
    pub student_id: String,
    pub first_name: String,
    pub last_name: Option<String>,
    pub date_of_birth: Option<DateTime<Utc>>,
    pub gender: Option<Gender>,
    pub address: Address,
    pub enrollment_date: Option<DateTime<Utc>>,
    pub program: Option<String>,
    pub branch: Option<String>,
    pub branchcode: Option<String>,
    pub current_semester: i64,
    pub status: StudentStatus,
    pub imageurl: Option<String>,
}

impl From<Student> for StudentProfile {
    fn from(value: Student) -> Self {
        StudentProfile {
            id: value.id,
            student_id: value.student_id,
            first_name: value.first_name,
            last_name: value.last_name,
            date_of_birth: to_chrono(value.date_of_birth),
            gender: value.gender,
            address: value.address,
            enrollment_date: to_chrono(value.enrollment_date),
            program: value.program,
            branch: value.branch,
            branchcode: value.branchcode,
            current_semester: value.current_semester,
            status: value.status,
            imageurl: value.imageurl,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PersonalDetails {
    pub student_id: String,
    pub contact: Contact,
}

impl From<Student> for PersonalDetails {
    fn from(value: Student) -> Self {
        PersonalDetails {
            student_id: value.student_id,
            contact: value.contact,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParentDetails {
    pub student_id: String,
    pub parents: Vec<Parent>,
}

impl From<Student> for ParentDetails {
    fn from(value: Student) -> Self {
        ParentDetails {
            student_id: value.student_id,
            parents: value.parents,
        }
    }
}

/// Everything known about a student, including their login account.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StudentDetails {
    pub username: String,
    pub email: String,
    pub role: crate::role::Role,
    #[serde(flatten)]
    pub profile: StudentProfile,
    pub contact: Contact,
    pub parents: Vec<Parent>,
}

impl StudentDetails {
    pub fn new(user: &crate::data::user::User, student: Student) -> StudentDetails {
        let contact = student.contact.clone();
        let parents = student.parents.clone();

        StudentDetails {
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role,
            profile: StudentProfile::from(student),
            contact,
            parents,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProfileResponse {
    pub profile: StudentProfile,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PersonalResponse {
    pub personal: PersonalDetails,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ParentResponse {
    pub parent: ParentDetails,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StudentDetailsResponse {
    pub student_details: StudentDetails,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn stored_student() -> bson::Document {
        doc! {
            "_id": ObjectId::new(),
            "studentId": "238T1A4252",
            "firstName": "Asha",
            "lastName": "Rao",
            "gender": "Female",
            "contact": { "email": "asha@example.com", "phone": "9000000000" },
            "address": { "city": "Guntur", "zipCode": "522001" },
            "parents": [
                { "relation": "Mother", "firstName": "Lakshmi", "contact": { "phone": "9111111111" } }
            ],
            "branch": "CSE",
            "branchcode": "05",
            "currentSemester": 5_i32,
            "status": "Active",
        }
    }

    #[test]
    fn reads_stored_student_documents() {
        let student: Student = bson::from_document(stored_student()).expect("student document");
        assert_eq!(student.student_id, "238T1A4252");
        assert_eq!(student.current_semester, 5);
        assert_eq!(student.address.zip_code.as_deref(), Some("522001"));
        assert_eq!(student.parents[0].relation, "Mother");
        assert_eq!(student.imageurl, None);
    }

    #[test]
    fn reads_every_stored_status() {
        for (stored, status) in [
            ("Active", StudentStatus::Active),
            ("Graduated", StudentStatus::Graduated),
            ("Suspended", StudentStatus::Suspended),
            ("On Leave", StudentStatus::OnLeave),
            ("Dropped Out", StudentStatus::DroppedOut),
        ] {
            let mut document = stored_student();
            document.insert("status", stored);

            let student: Student = bson::from_document(document).expect(stored);
            assert_eq!(student.status, status);
            assert_eq!(serde_json::to_value(status).unwrap(), stored);
        }
    }

    #[test]
    fn profile_hides_contact_and_parents() {
        let student: Student = bson::from_document(stored_student()).unwrap();
        let json = serde_json::to_value(StudentProfile::from(student.clone())).unwrap();

        assert_eq!(json["studentId"], "238T1A4252");
        assert_eq!(json["id"], student.id.to_hex());
        assert_eq!(json["currentSemester"], 5);
        assert!(json.get("contact").is_none());
        assert!(json.get("parents").is_none());

        let personal = serde_json::to_value(PersonalDetails::from(student.clone())).unwrap();
        assert_eq!(personal["contact"]["phone"], "9000000000");

        let parents = serde_json::to_value(ParentDetails::from(student)).unwrap();
        assert_eq!(parents["parents"][0]["firstName"], "Lakshmi");
    }
}
