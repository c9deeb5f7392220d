pub mod academic;
pub mod assignment;
pub mod course;
pub mod student;
pub mod upload;
pub mod user;
