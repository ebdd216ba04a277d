use async_trait::async_trait;
use chrono::NaiveDate;

use deptflow_core::domain::student::{InternshipStudentRecord, StudentId};
use deptflow_core::store::{StoreError, StudentDirectory};

use super::{decode_column, RepositoryError};
use crate::DbPool;

/// Students joined with their confirmed internship and host company.
pub struct SqlStudentDirectory {
    pool: DbPool,
}

impl SqlStudentDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn confirmed_interns(&self) -> Result<Vec<InternshipStudentRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT s.id, s.name, s.cgpa, s.semester,
                    c.name AS company_name, i.start_date, i.duration_weeks
             FROM students s
             JOIN internships i ON s.id = i.student_id
             JOIN companies c ON i.company_id = c.id
             WHERE i.status = 'confirmed'
             ORDER BY s.id ASC, i.id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_intern).collect()
    }
}

fn row_to_intern(row: &sqlx::sqlite::SqliteRow) -> Result<InternshipStudentRecord, RepositoryError> {
    let id: String = decode_column(row, "id")?;
    let start_date: String = decode_column(row, "start_date")?;
    let duration_weeks: i64 = decode_column(row, "duration_weeks")?;
    let semester: i64 = decode_column(row, "semester")?;

    let start_date = NaiveDate::parse_from_str(&start_date, "%Y-%m-%d").map_err(|error| {
        RepositoryError::Decode(format!("student `{id}` start_date `{start_date}`: {error}"))
    })?;
    let out_of_range =
        |column: &str, value: i64| RepositoryError::Decode(format!("student `{id}` {column}: {value}"));

    Ok(InternshipStudentRecord {
        name: decode_column(row, "name")?,
        company_name: decode_column(row, "company_name")?,
        start_date,
        duration_weeks: u32::try_from(duration_weeks)
            .map_err(|_| out_of_range("duration_weeks", duration_weeks))?,
        cgpa: decode_column(row, "cgpa")?,
        semester: u32::try_from(semester).map_err(|_| out_of_range("semester", semester))?,
        id: StudentId(id),
    })
}

#[async_trait]
impl StudentDirectory for SqlStudentDirectory {
    async fn internship_students(&self) -> Result<Vec<InternshipStudentRecord>, StoreError> {
        Ok(self.confirmed_interns().await?)
    }
}
