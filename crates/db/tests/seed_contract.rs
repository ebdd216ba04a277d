use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};

type SeedContractTestResult<T = ()> = Result<T, String>;

macro_rules! require {
    ($cond:expr) => {
        if !$cond {
            return Err(format!("assertion failed: `{}`", stringify!($cond)));
        }
    };
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            return Err(format!($($arg)*));
        }
    };
}

macro_rules! require_eq {
    ($left:expr, $right:expr) => {
        if $left != $right {
            return Err(format!(
                "assertion failed: `left == right` (`{:?}` != `{:?}`)",
                $left,
                $right
            ));
        }
    };
    ($left:expr, $right:expr, $($arg:tt)*) => {
        if $left != $right {
            return Err(format!($($arg)*));
        }
    };
}

const FIXTURE_SQL: &str = include_str!("../../../config/fixtures/campus_seed.sql");
const CONTRACT_JSON: &str = include_str!("../../../config/fixtures/campus_seed_contract.json");

#[derive(Debug, Deserialize)]
struct SeedContract {
    dataset_version: String,
    seed_dataset: String,
    policy: PolicyContract,
    interns: Vec<InternContract>,
    excluded_students: Vec<ExcludedStudent>,
    subjects: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PolicyContract {
    name: String,
    department: String,
    min_cgpa: f64,
    min_semester: u32,
    min_internship_weeks: u32,
    substitutions: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct InternContract {
    student_id: String,
    company_id: String,
    cgpa: f64,
    semester: u32,
    duration_weeks: u32,
    expected_eligible: bool,
}

#[derive(Debug, Deserialize)]
struct ExcludedStudent {
    student_id: String,
    internship_status: String,
}

fn contract() -> SeedContractTestResult<SeedContract> {
    serde_json::from_str(CONTRACT_JSON).map_err(|error| format!("seed contract must parse: {error}"))
}

/// The internship row for `student_id`, as written in the fixture.
fn internship_row<'a>(student_id: &str) -> SeedContractTestResult<&'a str> {
    FIXTURE_SQL
        .lines()
        .find(|line| line.trim_start().starts_with('(') && line.contains(&format!(", '{student_id}', 'COMP")))
        .ok_or_else(|| format!("no internship row for {student_id}"))
}

#[test]
fn seed_contract_matches_campus_seed_sql_fixture() -> SeedContractTestResult {
    let contract = contract()?;
    require_eq!(contract.dataset_version, "campus-2024.1");
    require_eq!(contract.seed_dataset, "internship_subject_swap");

    let mut seen = HashSet::new();
    for intern in &contract.interns {
        require!(seen.insert(intern.student_id.clone()), "duplicate intern {}", intern.student_id);

        let row = internship_row(&intern.student_id)?;
        require!(
            row.contains(&format!("'{}'", intern.company_id)),
            "internship for {} should be hosted by {}",
            intern.student_id,
            intern.company_id
        );
        require!(row.contains("'confirmed'"), "internship for {} should be confirmed", intern.student_id);
        require!(
            row.contains(&format!(", {}, ", intern.duration_weeks)),
            "internship for {} should last {} weeks",
            intern.student_id,
            intern.duration_weeks
        );
        require!(
            FIXTURE_SQL.contains(&format!("{}, {:.1},", intern.semester, intern.cgpa)),
            "student {} should be seeded with semester {} and cgpa {}",
            intern.student_id,
            intern.semester,
            intern.cgpa
        );
    }

    for excluded in &contract.excluded_students {
        let row = internship_row(&excluded.student_id)?;
        require!(
            row.contains(&format!("'{}'", excluded.internship_status)),
            "internship for {} should be {}",
            excluded.student_id,
            excluded.internship_status
        );
        require!(!seen.contains(&excluded.student_id));
    }

    for code in &contract.subjects {
        require!(FIXTURE_SQL.contains(&format!("'{code}'")), "subject {code} should be seeded");
    }
    Ok(())
}

#[test]
fn expected_eligibility_follows_policy_thresholds() -> SeedContractTestResult {
    let contract = contract()?;
    let policy = &contract.policy;

    let mut eligible = 0;
    for intern in &contract.interns {
        let meets_criteria = intern.cgpa >= policy.min_cgpa
            && intern.semester >= policy.min_semester
            && intern.duration_weeks >= policy.min_internship_weeks;
        require_eq!(
            meets_criteria,
            intern.expected_eligible,
            "eligibility mismatch for {}",
            intern.student_id
        );
        eligible += usize::from(meets_criteria);
    }
    require!(eligible > 0, "seed should contain eligible interns");
    require!(eligible < contract.interns.len(), "seed should contain an ineligible intern");
    Ok(())
}

#[test]
fn policy_rules_in_fixture_match_contract() -> SeedContractTestResult {
    let contract = contract()?;
    let policy = &contract.policy;

    require!(FIXTURE_SQL.contains(&format!("'{}', '{}'", policy.name, policy.department)));
    require!(
        FIXTURE_SQL.contains(&format!("\"min_cgpa\":{}", policy.min_cgpa)),
        "fixture policy should carry min_cgpa {}",
        policy.min_cgpa
    );
    for (original, replacement) in &policy.substitutions {
        require!(
            FIXTURE_SQL.contains(&format!("\"{original}\":\"{replacement}\"")),
            "fixture policy should substitute {original} with {replacement}"
        );
    }
    Ok(())
}
