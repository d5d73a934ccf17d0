//! Parameterized statements, one per record kind, plus the table layout they
//! write to.

/// Idempotent table definitions. `employment` is the company/person edge and
/// carries the edge attributes.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS person (
    person_id INTEGER PRIMARY KEY,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS company (
    company_id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    headcount INTEGER,
    acquired_by INTEGER REFERENCES company (company_id),
    merged_into_parent_company BOOLEAN
);

CREATE TABLE IF NOT EXISTS employment (
    company_id INTEGER NOT NULL REFERENCES company (company_id),
    person_id INTEGER NOT NULL REFERENCES person (person_id),
    employment_title TEXT NOT NULL,
    start_date TIMESTAMPTZ,
    end_date TIMESTAMPTZ,
    PRIMARY KEY (company_id, person_id)
);
"#;

/// `$1 person_id, $2 name`
pub const INSERT_PERSON: &str = "INSERT INTO person (person_id, name) VALUES ($1, $2)";

/// `$1 company_id, $2 company_name, $3 headcount`
pub const INSERT_COMPANY: &str =
    "INSERT INTO company (company_id, name, headcount) VALUES ($1, $2, $3)";

/// `$1 acquired_company_id, $2 parent_company_id, $3 merged_into_parent_company`.
/// Affects zero rows when the acquired company is unknown; an unknown parent
/// fails the foreign key.
pub const UPDATE_ACQUISITION: &str = "UPDATE company \
     SET acquired_by = $2, merged_into_parent_company = $3 \
     WHERE company_id = $1";

/// `$1 company_id, $2 person_id, $3 employment_title, $4 start_date, $5 end_date`.
/// Re-adding an existing edge replaces its attributes.
pub const UPSERT_EMPLOYMENT: &str = "INSERT INTO employment \
     (company_id, person_id, employment_title, start_date, end_date) \
     VALUES ($1, $2, $3, $4, $5) \
     ON CONFLICT (company_id, person_id) DO UPDATE SET \
     employment_title = EXCLUDED.employment_title, \
     start_date = EXCLUDED.start_date, \
     end_date = EXCLUDED.end_date";
