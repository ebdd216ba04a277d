use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StudentId(pub String);

/// A student with an active internship, as returned by the student directory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InternshipStudentRecord {
    pub id: StudentId,
    pub name: String,
    pub company_name: String,
    pub start_date: NaiveDate,
    pub duration_weeks: u32,
    pub cgpa: f64,
    pub semester: u32,
}
