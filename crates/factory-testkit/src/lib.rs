// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod backend;

pub use backend::{DEMO_PASSWORD, MockBackend};

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use factory_app::{
    ADD_USER_SCOPE, Company, CompanyId, EDIT_USER_SCOPE, Item, ItemId, Job, JobId, JobStatus,
    Permission, PermissionId, RecordStatus, Role, RoleId, SUPER_ADMIN_ROLE, Team, TeamId, User,
    UserId,
};
use std::path::PathBuf;
use time::{Date, Duration, Month, OffsetDateTime, Time};

const REFERENCE_YEAR: i32 = 2026;

const FIRST_NAMES: [&str; 16] = [
    "Avery", "Jordan", "Taylor", "Riley", "Morgan", "Casey", "Alexis", "Quinn", "Parker", "Drew",
    "Kairo", "Elliot", "Robin", "Cameron", "Hayden", "Rowan",
];
const LAST_NAMES: [&str; 18] = [
    "Walker", "Martin", "Hill", "Evans", "Lopez", "Gray", "Ward", "Young", "Diaz", "Reed",
    "Campbell", "Turner", "Flores", "Bennett", "Price", "Morris", "Foster", "Brooks",
];

const COMPANY_ADJECTIVES: [&str; 10] = [
    "Premier", "Central", "Reliable", "Summit", "Eagle", "Heritage", "Apex", "Northern",
    "Atlas", "Pioneer",
];
const COMPANY_TRADES: [&str; 8] = [
    "Castings",
    "Fabrication",
    "Metalworks",
    "Plastics",
    "Components",
    "Machining",
    "Assemblies",
    "Coatings",
];
const COMPANY_SUFFIXES: [&str; 4] = ["Ltd", "Co", "Industries", "Group"];
const STATES: [&str; 10] = [
    "Ohio",
    "Texas",
    "Michigan",
    "Indiana",
    "Georgia",
    "Oregon",
    "Arizona",
    "Nevada",
    "Utah",
    "Iowa",
];
const STREET_NAMES: [&str; 10] = [
    "Foundry", "Mill", "Industrial", "Harbor", "Rail", "Forge", "Canal", "Quarry", "Depot",
    "Works",
];

const ITEM_CATEGORIES: [&str; 6] = [
    "Fastener",
    "Sheet Metal",
    "Casting",
    "Electrical",
    "Hydraulic",
    "Packaging",
];
const ITEM_MATERIALS: [&str; 6] = ["Steel", "Aluminium", "Brass", "Copper", "Nylon", "Rubber"];
const ITEM_NOUNS: [&str; 10] = [
    "Bolt", "Bracket", "Flange", "Gasket", "Housing", "Bushing", "Valve", "Panel", "Spacer",
    "Coupling",
];
const ITEM_UNITS: [&str; 4] = ["pcs", "kg", "m", "l"];
const ITEM_STATUSES: [&str; 3] = ["ACTIVE", "INACTIVE", "QC_PENDING"];

const JOB_VERBS: [&str; 6] = ["Assemble", "Machine", "Inspect", "Coat", "Weld", "Pack"];

const TEAM_NAMES: [&str; 5] = ["Welding", "Assembly", "Machining", "Quality", "Maintenance"];

const PERMISSION_NAMES: [&str; 8] = [
    "ADD_USER",
    "EDIT_USER",
    "VIEW_REPORTS",
    "MANAGE_ITEMS",
    "MANAGE_JOBS",
    "MANAGE_COMPANIES",
    "ASSIGN_ROLES",
    "EXPORT_DATA",
];

/// Role name, description and granted permission names.
const ROLES: [(&str, &str, &[&str]); 5] = [
    (
        SUPER_ADMIN_ROLE,
        "Full access to every screen",
        &PERMISSION_NAMES,
    ),
    (
        "ADMIN",
        "Manages users and master data",
        &[
            "ADD_USER",
            "EDIT_USER",
            "MANAGE_ITEMS",
            "MANAGE_COMPANIES",
            "ASSIGN_ROLES",
        ],
    ),
    (
        "SUPERVISOR",
        "Runs the shop floor",
        &["EDIT_USER", "MANAGE_JOBS", "VIEW_REPORTS"],
    ),
    ("OPERATOR", "Works assigned jobs", &["VIEW_REPORTS"]),
    ("QC_INSPECTOR", "Signs off quality checks", &["MANAGE_ITEMS"]),
];

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }

    fn bool(&mut self) -> bool {
        (self.next_u64() & 1) == 1
    }
}

/// Seeded generator of factory records. The same seed always yields the
/// same records.
#[derive(Debug, Clone)]
pub struct FactoryFaker {
    rng: DeterministicRng,
    seed: u64,
}

impl FactoryFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
            seed: normalized,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn int_n(&mut self, n: usize) -> usize {
        self.rng.int_n(n)
    }

    pub fn teams() -> Vec<Team> {
        TEAM_NAMES
            .iter()
            .zip(1_i64..)
            .map(|(name, id)| Team {
                id: TeamId::new(id),
                name: (*name).to_owned(),
            })
            .collect()
    }

    pub fn permissions() -> Vec<Permission> {
        PERMISSION_NAMES
            .iter()
            .zip(1_i64..)
            .map(|(name, id)| Permission {
                id: PermissionId::new(id),
                name: (*name).to_owned(),
            })
            .collect()
    }

    pub fn roles() -> Vec<Role> {
        let permissions = Self::permissions();
        ROLES
            .iter()
            .zip(1_i64..)
            .map(|((name, description, granted), id)| Role {
                id: RoleId::new(id),
                name: (*name).to_owned(),
                description: (*description).to_owned(),
                permissions: permissions
                    .iter()
                    .filter(|permission| granted.contains(&permission.name.as_str()))
                    .cloned()
                    .collect(),
            })
            .collect()
    }

    pub fn company(&mut self, id: i64) -> Company {
        let name = format!(
            "{} {} {}",
            self.pick(&COMPANY_ADJECTIVES),
            self.pick(&COMPANY_TRADES),
            self.pick(&COMPANY_SUFFIXES),
        );
        let status = if self.rng.int_n(5) == 0 {
            RecordStatus::Inactive
        } else {
            RecordStatus::Active
        };
        Company {
            id: CompanyId::new(id),
            code: format!("C{id:03}"),
            name,
            subcontractor: self.rng.bool(),
            state: self.pick(&STATES).to_owned(),
            status,
            contact_name: format!("{} {}", self.pick(&FIRST_NAMES), self.pick(&LAST_NAMES)),
            mobile_phone: format!(
                "555-{:03}-{:04}",
                self.int_range(100, 999),
                self.int_range(0, 9999)
            ),
            address: format!(
                "{} {} Road",
                self.int_range(10, 9999),
                self.pick(&STREET_NAMES)
            ),
        }
    }

    /// A user tied to existing companies, teams and roles by name.
    pub fn user(&mut self, id: i64, companies: &[Company], roles: &[Role]) -> User {
        let first_name = self.pick(&FIRST_NAMES).to_owned();
        let last_name = self.pick(&LAST_NAMES).to_owned();
        let username = format!("{}{}{id}", first_name.to_lowercase(), &last_name[..1]).to_lowercase();

        let mut company = Vec::new();
        if !companies.is_empty() {
            company.push(companies[self.rng.int_n(companies.len())].name.clone());
            if self.rng.int_n(4) == 0 {
                let extra = companies[self.rng.int_n(companies.len())].name.clone();
                if !company.contains(&extra) {
                    company.push(extra);
                }
            }
        }

        let mut engineering_team = vec![self.pick(&TEAM_NAMES).to_owned()];
        if self.rng.bool() {
            let extra = self.pick(&TEAM_NAMES).to_owned();
            if !engineering_team.contains(&extra) {
                engineering_team.push(extra);
            }
        }

        // Super admins are seeded explicitly, never at random.
        let role = if roles.len() > 1 {
            roles[1 + self.rng.int_n(roles.len() - 1)].name.clone()
        } else {
            String::new()
        };

        let status = if self.rng.int_n(6) == 0 {
            RecordStatus::Inactive
        } else {
            RecordStatus::Active
        };
        let date_of_birth = (self.rng.int_n(10) != 0).then(|| {
            self.date_between(
                calendar_date(1960, Month::January, 1),
                calendar_date(2004, Month::December, 31),
            )
        });

        User {
            user_id: UserId::new(id.to_string()),
            username,
            first_name,
            last_name,
            company,
            engineering_team,
            date_of_birth,
            project_manager: Some(role.eq_ignore_ascii_case("SUPERVISOR")),
            role,
            status,
            image: String::new(),
        }
    }

    pub fn item(&mut self, id: i64) -> Item {
        let category = self.pick(&ITEM_CATEGORIES).to_owned();
        let material = self.pick(&ITEM_MATERIALS).to_owned();
        let created_at = self.datetime_in_year(REFERENCE_YEAR - 1);
        let updated_at = created_at + Duration::days(self.int_range(0, 200));
        let qc_date = (self.rng.int_n(4) != 0).then(|| {
            self.date_between(
                calendar_date(REFERENCE_YEAR - 1, Month::January, 1),
                calendar_date(REFERENCE_YEAR, Month::June, 30),
            )
        });
        Item {
            id: ItemId::new(id),
            code: format!("IT-{id:04}"),
            name: format!("{} {}", material, self.pick(&ITEM_NOUNS)),
            category,
            material,
            quantity: self.int_range(0, 5000) as f64 / 4.0,
            unit: self.pick(&ITEM_UNITS).to_owned(),
            status: self.pick(&ITEM_STATUSES).to_owned(),
            qc_date,
            created_at: Some(created_at),
            updated_at: Some(updated_at),
        }
    }

    pub fn job(&mut self, id: i64, company_code: &str) -> Job {
        let status = JobStatus::ALL[self.rng.int_n(JobStatus::ALL.len())];
        let start = self.date_between(
            calendar_date(REFERENCE_YEAR - 1, Month::March, 1),
            calendar_date(REFERENCE_YEAR, Month::March, 31),
        );
        let due_date = (status != JobStatus::Planned || self.rng.bool())
            .then(|| start + Duration::days(self.int_range(7, 120)));
        Job {
            id: JobId::new(id),
            code: format!("JOB-{id:04}"),
            name: format!("{} {}", self.pick(&JOB_VERBS), self.pick(&ITEM_NOUNS)),
            company_code: company_code.to_owned(),
            status,
            start_date: Some(start),
            due_date,
        }
    }

    pub fn date_between(&mut self, start: Date, end: Date) -> Date {
        let span = i64::from(end.to_julian_day() - start.to_julian_day());
        if span <= 0 {
            return start;
        }
        start + Duration::days(self.int_range(0, span))
    }

    pub fn datetime_in_year(&mut self, year: i32) -> OffsetDateTime {
        let day = self.date_between(
            calendar_date(year, Month::January, 1),
            calendar_date(year, Month::December, 31),
        );
        let seconds = self.int_range(0, 86_399);
        day.with_time(Time::MIDNIGHT).assume_utc() + Duration::seconds(seconds)
    }

    fn pick<'a>(&mut self, items: &'a [&'a str]) -> &'a str {
        items[self.rng.int_n(items.len())]
    }

    fn int_range(&mut self, min: i64, max: i64) -> i64 {
        if max <= min {
            return min;
        }
        let span = max - min + 1;
        min + (self.rng.next_u64() % (span as u64)) as i64
    }
}

/// A consistent set of records for the mock backend and `--demo`.
#[derive(Debug, Clone, PartialEq)]
pub struct DemoData {
    pub users: Vec<User>,
    pub companies: Vec<Company>,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
    pub items: Vec<Item>,
    pub jobs: Vec<Job>,
    pub teams: Vec<Team>,
    pub column_config: Option<String>,
}

impl DemoData {
    pub const ADMIN_USERNAME: &'static str = "admin";
    pub const ROOT_USERNAME: &'static str = "root";

    pub fn generate(seed: u64) -> Self {
        let mut faker = FactoryFaker::new(seed);
        let roles = FactoryFaker::roles();
        let teams = FactoryFaker::teams();
        let companies: Vec<Company> = (1..=12).map(|id| faker.company(id)).collect();

        let mut users = vec![
            seeded_user(1, Self::ROOT_USERNAME, "Root", "Owner", SUPER_ADMIN_ROLE, &companies),
            seeded_user(2, Self::ADMIN_USERNAME, "Ada", "Admin", "ADMIN", &companies),
        ];
        users.extend((3..=48).map(|id| faker.user(id, &companies, &roles)));

        let items = (1..=140).map(|id| faker.item(id)).collect();
        let jobs = (1..=36)
            .map(|id| {
                let code = companies[faker.int_n(companies.len())].code.clone();
                faker.job(id, &code)
            })
            .collect();

        Self {
            users,
            companies,
            roles,
            permissions: FactoryFaker::permissions(),
            items,
            jobs,
            teams,
            column_config: None,
        }
    }

    /// Scopes a login as `username` is granted, from the user's role.
    pub fn scopes_for(&self, username: &str) -> Vec<String> {
        let Some(user) = self.users.iter().find(|user| user.username == username) else {
            return Vec::new();
        };
        self.roles
            .iter()
            .find(|role| role.name.eq_ignore_ascii_case(&user.role))
            .map(|role| {
                role.permissions
                    .iter()
                    .map(|permission| permission.name.clone())
                    .filter(|name| name == ADD_USER_SCOPE || name == EDIT_USER_SCOPE)
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn seeded_user(
    id: i64,
    username: &str,
    first_name: &str,
    last_name: &str,
    role: &str,
    companies: &[Company],
) -> User {
    User {
        user_id: UserId::new(id.to_string()),
        username: username.to_owned(),
        first_name: first_name.to_owned(),
        last_name: last_name.to_owned(),
        company: companies
            .first()
            .map(|company| vec![company.name.clone()])
            .unwrap_or_default(),
        engineering_team: vec![TEAM_NAMES[0].to_owned()],
        date_of_birth: Some(calendar_date(1985, Month::May, 14)),
        role: role.to_owned(),
        status: RecordStatus::Active,
        image: String::new(),
        project_manager: Some(false),
    }
}

/// Unsigned JWT-shaped token whose payload carries `sub` and `scope`.
pub fn demo_token(subject: &str, scopes: &[String]) -> String {
    let payload = serde_json::json!({
        "sub": subject,
        "scope": scopes.join(" "),
    });
    format!(
        "eyJhbGciOiJub25lIn0.{}.demo",
        URL_SAFE_NO_PAD.encode(payload.to_string())
    )
}

pub fn temp_session_path() -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let path = dir.path().join("session.db");
    Ok((dir, path))
}

pub fn fixture_datetime() -> &'static str {
    "2026-02-19T12:34:56Z"
}

fn calendar_date(year: i32, month: Month, day: u8) -> Date {
    Date::from_calendar_date(year, month, day).unwrap_or(Date::MIN)
}
