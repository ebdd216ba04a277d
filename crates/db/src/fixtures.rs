//! Campus seed dataset shared by the SQL fixture and [`InMemoryCampusDirectory`].
//!
//! [`InMemoryCampusDirectory`]: crate::repositories::InMemoryCampusDirectory

use chrono::NaiveDate;
use serde_json::json;
use tracing::info;

use deptflow_core::domain::policy::Policy;
use deptflow_core::domain::student::{InternshipStudentRecord, StudentId};
use deptflow_core::flows::internship::SWAP_POLICY_NAME;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Students holding a confirmed internship in the seed. S004 sits below the CGPA floor.
const SEED_INTERNS: &[SeedIntern] = &[
    SeedIntern {
        student_id: "S001",
        name: "John Doe",
        company_name: "TechCorp Solutions",
        start: (2024, 6, 1),
        duration_weeks: 12,
        cgpa: 8.5,
        semester: 6,
    },
    SeedIntern {
        student_id: "S002",
        name: "Jane Smith",
        company_name: "InnovateLab",
        start: (2024, 6, 15),
        duration_weeks: 10,
        cgpa: 7.8,
        semester: 6,
    },
    SeedIntern {
        student_id: "S003",
        name: "Mike Johnson",
        company_name: "TechCorp Solutions",
        start: (2024, 6, 1),
        duration_weeks: 8,
        cgpa: 8.2,
        semester: 6,
    },
    SeedIntern {
        student_id: "S004",
        name: "Priya Patel",
        company_name: "DataWorks Analytics",
        start: (2024, 7, 1),
        duration_weeks: 10,
        cgpa: 5.0,
        semester: 6,
    },
];

/// Seeded students without a confirmed internship.
const SEED_OTHER_STUDENT_IDS: &[&str] = &["S005"];
const SEED_COMPANY_IDS: &[&str] = &["COMP001", "COMP002", "COMP003"];
const SEED_INTERNSHIP_IDS: &[i64] = &[1, 2, 3, 4, 5];
const SEED_SUBJECT_CODES: &[&str] = &["CS501", "CS502", "CS401", "CS601"];
const SWAP_POLICY_DEPARTMENT: &str = "academics";

#[derive(Debug, Clone, Copy)]
struct SeedIntern {
    student_id: &'static str,
    name: &'static str,
    company_name: &'static str,
    start: (i32, u32, u32),
    duration_weeks: u32,
    cgpa: f64,
    semester: u32,
}

impl SeedIntern {
    fn record(&self) -> Option<InternshipStudentRecord> {
        let (year, month, day) = self.start;
        Some(InternshipStudentRecord {
            id: StudentId(self.student_id.to_string()),
            name: self.name.to_string(),
            company_name: self.company_name.to_string(),
            start_date: NaiveDate::from_ymd_opt(year, month, day)?,
            duration_weeks: self.duration_weeks,
            cgpa: self.cgpa,
            semester: self.semester,
        })
    }
}

/// Confirmed interns of the seed, ordered by student id.
pub fn seed_interns() -> Vec<InternshipStudentRecord> {
    SEED_INTERNS.iter().filter_map(SeedIntern::record).collect()
}

/// The academics subject swap policy as seeded.
pub fn seed_swap_policy() -> Policy {
    Policy::new(
        SWAP_POLICY_NAME,
        "Policy for subject substitution during internship semester",
        json!({
            "substitutions": {
                "Departmental Elective-2": "Mobile Applications",
                "Open Elective": "Project Report"
            },
            "eligibility": { "min_cgpa": 6.5, "completed_credits": 120 }
        }),
    )
}

pub fn swap_policy_department() -> &'static str {
    SWAP_POLICY_DEPARTMENT
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeedResult {
    pub students_seeded: usize,
    pub interns_seeded: usize,
    pub policies_seeded: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

impl VerificationResult {
    pub fn missing(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.checks.iter().filter(|(_, present)| !present).map(|(label, _)| *label)
    }
}

/// Deterministic campus fixture: students, companies, internships, subjects and
/// the subject swap policy. Loading is idempotent.
pub struct CampusSeedDataset;

impl CampusSeedDataset {
    pub const SQL: &'static str = include_str!("../../../config/fixtures/campus_seed.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        sqlx::raw_sql(Self::SQL).execute(&mut *tx).await?;
        tx.commit().await?;

        let result = SeedResult {
            students_seeded: SEED_INTERNS.len() + SEED_OTHER_STUDENT_IDS.len(),
            interns_seeded: SEED_INTERNS.len(),
            policies_seeded: 1,
        };
        info!(
            event_name = "db.fixtures.campus_seed_loaded",
            correlation_id = "seed",
            students = result.students_seeded,
            interns = result.interns_seeded,
            "campus seed dataset loaded"
        );
        Ok(result)
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for intern in SEED_INTERNS {
            let confirmed: i64 = sqlx::query_scalar(
                "SELECT EXISTS(
                     SELECT 1 FROM students s
                     JOIN internships i ON s.id = i.student_id
                     JOIN companies c ON i.company_id = c.id
                     WHERE s.id = ?1 AND c.name = ?2 AND i.status = 'confirmed'
                 )",
            )
            .bind(intern.student_id)
            .bind(intern.company_name)
            .fetch_one(pool)
            .await?;
            checks.push((intern.student_id, confirmed == 1));
        }

        for student_id in SEED_OTHER_STUDENT_IDS {
            let unconfirmed: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM students WHERE id = ?1)
                     AND NOT EXISTS(
                         SELECT 1 FROM internships WHERE student_id = ?1 AND status = 'confirmed'
                     )",
            )
            .bind(student_id)
            .fetch_one(pool)
            .await?;
            checks.push((*student_id, unconfirmed == 1));
        }

        checks.push(("companies", count_in(pool, "companies", "id", SEED_COMPANY_IDS).await?));
        checks.push(("subjects", count_in(pool, "subjects", "code", SEED_SUBJECT_CODES).await?));

        let policy_active: i64 = sqlx::query_scalar(
            "SELECT EXISTS(
                 SELECT 1 FROM policies WHERE name = ?1 AND department = ?2 AND status = 'active'
             )",
        )
        .bind(SWAP_POLICY_NAME)
        .bind(SWAP_POLICY_DEPARTMENT)
        .fetch_one(pool)
        .await?;
        checks.push(("swap-policy", policy_active == 1));

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes seeded rows. Workflow history is left alone.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let student_ids: Vec<&str> = SEED_INTERNS
            .iter()
            .map(|intern| intern.student_id)
            .chain(SEED_OTHER_STUDENT_IDS.iter().copied())
            .collect();
        let internship_ids = SEED_INTERNSHIP_IDS
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(", ");

        let mut tx = pool.begin().await?;
        sqlx::query(&format!("DELETE FROM internships WHERE id IN ({internship_ids})"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM students WHERE id IN {}", sql_array(&student_ids)))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM companies WHERE id IN {}", sql_array(SEED_COMPANY_IDS)))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM subjects WHERE code IN {}", sql_array(SEED_SUBJECT_CODES)))
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM policies WHERE name = ?1 AND department = ?2")
            .bind(SWAP_POLICY_NAME)
            .bind(SWAP_POLICY_DEPARTMENT)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

async fn count_in(
    pool: &DbPool,
    table: &str,
    column: &str,
    ids: &[&str],
) -> Result<bool, RepositoryError> {
    let found: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(1) FROM {table} WHERE {column} IN {}",
        sql_array(ids)
    ))
    .fetch_one(pool)
    .await?;
    Ok(found == ids.len() as i64)
}

/// Quoted SQL list for fixed fixture ids.
fn sql_array(ids: &[&str]) -> String {
    let quoted =
        ids.iter().map(|id| format!("'{}'", id.replace('\'', "''"))).collect::<Vec<_>>().join(", ");
    format!("({quoted})")
}

#[cfg(test)]
mod tests {
    use super::{seed_interns, seed_swap_policy, CampusSeedDataset};
    use crate::{connect_with_settings, migrations::run_pending, DbPool};

    async fn pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrations");
        pool
    }

    #[test]
    fn seed_interns_are_ordered_by_student_id() {
        let ids: Vec<_> = seed_interns().into_iter().map(|intern| intern.id.0).collect();
        assert_eq!(ids, ["S001", "S002", "S003", "S004"]);
    }

    #[test]
    fn seed_policy_sets_the_cgpa_floor() {
        let policy = seed_swap_policy();
        assert_eq!(policy.rules["eligibility"]["min_cgpa"], 6.5);
        assert_eq!(policy.rules["substitutions"]["Departmental Elective-2"], "Mobile Applications");
    }

    #[tokio::test]
    async fn verify_fails_before_load_and_passes_after() {
        let pool = pool().await;

        let before = CampusSeedDataset::verify(&pool).await.expect("verify");
        assert!(!before.all_present);
        assert!(before.missing().any(|label| label == "swap-policy"));

        let seeded = CampusSeedDataset::load(&pool).await.expect("load");
        assert_eq!(seeded.interns_seeded, 4);

        let after = CampusSeedDataset::verify(&pool).await.expect("verify");
        assert!(after.all_present, "missing: {:?}", after.missing().collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn load_is_idempotent() {
        let pool = pool().await;
        CampusSeedDataset::load(&pool).await.expect("first load");
        CampusSeedDataset::load(&pool).await.expect("second load");

        let students: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM students")
            .fetch_one(&pool)
            .await
            .expect("count");
        assert_eq!(students, 5);
    }

    #[tokio::test]
    async fn clean_removes_seeded_rows() {
        let pool = pool().await;
        CampusSeedDataset::load(&pool).await.expect("load");
        CampusSeedDataset::clean(&pool).await.expect("clean");

        for table in ["students", "companies", "internships", "subjects", "policies"] {
            let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
                .fetch_one(&pool)
                .await
                .expect("count");
            assert_eq!(count, 0, "{table} not cleaned");
        }
    }
}
