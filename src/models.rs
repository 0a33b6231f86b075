use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};

// Enumerations are stored as their lowercase wire names, the same strings the
// CHECK constraints in db.rs accept.
macro_rules! text_enum {
    ($name:ident, $what:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = TrackerError;

            fn from_str(s: &str) -> Result<Self> {
                match s.trim() {
                    $($text => Ok($name::$variant),)+
                    other => Err(TrackerError::Validation(format!(
                        concat!("unknown ", $what, " '{}'"),
                        other
                    ))),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: TrackerError| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pendiente,
    EnRevision,
    TeContestaron,
    EntrevistaProgramada,
    Rechazada,
    Aceptada,
    DescartadaPorMi,
}

text_enum!(ApplicationStatus, "status", {
    Pendiente => "pendiente",
    EnRevision => "en_revision",
    TeContestaron => "te_contestaron",
    EntrevistaProgramada => "entrevista_programada",
    Rechazada => "rechazada",
    Aceptada => "aceptada",
    DescartadaPorMi => "descartada_por_mi",
});

impl ApplicationStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ApplicationStatus::Pendiente => "Pendiente",
            ApplicationStatus::EnRevision => "En Revisión",
            ApplicationStatus::TeContestaron => "Te Contestaron",
            ApplicationStatus::EntrevistaProgramada => "Entrevista Programada",
            ApplicationStatus::Rechazada => "Rechazada",
            ApplicationStatus::Aceptada => "Aceptada",
            ApplicationStatus::DescartadaPorMi => "Descartada por Mí",
        }
    }

    /// The company answered in some way, positive or negative.
    pub fn is_response(&self) -> bool {
        matches!(
            self,
            ApplicationStatus::EntrevistaProgramada
                | ApplicationStatus::Aceptada
                | ApplicationStatus::TeContestaron
                | ApplicationStatus::Rechazada
        )
    }

    /// Reached an interview or better.
    pub fn is_interview(&self) -> bool {
        matches!(
            self,
            ApplicationStatus::EntrevistaProgramada | ApplicationStatus::Aceptada
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Linkedin,
    Indeed,
    Computrabajo,
    OccMundial,
    Glassdoor,
    SitioEmpresa,
    EmailDirecto,
    Referido,
    Otro,
}

text_enum!(Platform, "platform", {
    Linkedin => "linkedin",
    Indeed => "indeed",
    Computrabajo => "computrabajo",
    OccMundial => "occ_mundial",
    Glassdoor => "glassdoor",
    SitioEmpresa => "sitio_empresa",
    EmailDirecto => "email_directo",
    Referido => "referido",
    Otro => "otro",
});

impl Platform {
    pub fn label(&self) -> &'static str {
        match self {
            Platform::Linkedin => "LinkedIn",
            Platform::Indeed => "Indeed",
            Platform::Computrabajo => "Computrabajo",
            Platform::OccMundial => "OCC Mundial",
            Platform::Glassdoor => "Glassdoor",
            Platform::SitioEmpresa => "Sitio de la Empresa",
            Platform::EmailDirecto => "Email Directo",
            Platform::Referido => "Referido",
            Platform::Otro => "Otro",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SalaryCurrency {
    Usd,
    Mxn,
    Eur,
}

text_enum!(SalaryCurrency, "currency", {
    Usd => "USD",
    Mxn => "MXN",
    Eur => "EUR",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SalaryPeriod {
    Mensual,
    Anual,
}

text_enum!(SalaryPeriod, "salary period", {
    Mensual => "mensual",
    Anual => "anual",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationType {
    Remoto,
    Presencial,
    Hibrido,
}

text_enum!(LocationType, "location type", {
    Remoto => "remoto",
    Presencial => "presencial",
    Hibrido => "hibrido",
});

/// Wallet address that owns a set of applications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnerId(String);

impl OwnerId {
    pub fn parse(address: &str) -> Result<Self> {
        let address = address.trim();
        if address.is_empty() {
            return Err(TrackerError::Validation("wallet address is empty".into()));
        }
        Ok(Self(address.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for OwnerId {
    type Error = TrackerError;

    fn try_from(address: String) -> Result<Self> {
        Self::parse(&address)
    }
}

impl From<OwnerId> for String {
    fn from(owner: OwnerId) -> Self {
        owner.0
    }
}

impl ToSql for OwnerId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        self.0.to_sql()
    }
}

impl FromSql for OwnerId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        String::column_result(value).map(OwnerId)
    }
}

/// Opaque, database-assigned record id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(String);

impl ApplicationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ApplicationId {
    fn from(id: &str) -> Self {
        Self(id.trim().to_string())
    }
}

impl From<String> for ApplicationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl ToSql for ApplicationId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        self.0.to_sql()
    }
}

impl FromSql for ApplicationId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        String::column_result(value).map(ApplicationId)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub wallet_address: OwnerId,
    pub company_name: String,
    pub position_title: String,
    pub platform: Platform,
    pub platform_other: Option<String>, // only meaningful for "otro"
    pub application_date: NaiveDate,
    pub status: ApplicationStatus,
    pub salary_min: Option<f64>,
    pub salary_max: Option<f64>,
    pub salary_currency: Option<SalaryCurrency>,
    pub salary_period: Option<SalaryPeriod>,
    pub salary_not_specified: bool,
    pub location_type: Option<LocationType>,
    pub location_city: Option<String>, // only meaningful for "presencial"
    pub job_url: Option<String>,
    pub personal_notes: Option<String>,
    pub is_priority: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    /// Free-text platform name when "otro" was chosen, the label otherwise.
    pub fn platform_name(&self) -> &str {
        match (&self.platform, self.platform_other.as_deref()) {
            (Platform::Otro, Some(other)) if !other.trim().is_empty() => other,
            (platform, _) => platform.label(),
        }
    }
}

/// Append-only audit row for a status change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub id: String,
    pub application_id: ApplicationId,
    pub wallet_address: OwnerId,
    pub old_status: Option<ApplicationStatus>,
    pub new_status: ApplicationStatus,
    pub notes: Option<String>,
    pub changed_at: DateTime<Utc>,
}

/// Fields a user submits when creating an application. The owner is never
/// part of this: it comes from the session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewApplication {
    pub company_name: String,
    pub position_title: String,
    pub platform: Option<Platform>,
    pub platform_other: Option<String>,
    pub application_date: Option<NaiveDate>, // defaults to today
    pub status: Option<ApplicationStatus>,   // defaults to pendiente
    pub salary_min: Option<f64>,
    pub salary_max: Option<f64>,
    pub salary_currency: Option<SalaryCurrency>,
    pub salary_period: Option<SalaryPeriod>,
    pub salary_not_specified: bool,
    pub location_type: Option<LocationType>,
    pub location_city: Option<String>,
    pub job_url: Option<String>,
    pub personal_notes: Option<String>,
    pub is_priority: bool,
}

impl NewApplication {
    pub fn new(company_name: &str, position_title: &str, platform: Platform) -> Self {
        Self {
            company_name: company_name.to_string(),
            position_title: position_title.to_string(),
            platform: Some(platform),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.company_name.trim().is_empty() {
            missing.push("company name");
        }
        if self.position_title.trim().is_empty() {
            missing.push("position title");
        }
        if self.platform.is_none() {
            missing.push("platform");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(TrackerError::Validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )))
        }
    }

    pub(crate) fn normalized(mut self) -> Self {
        self.company_name = self.company_name.trim().to_string();
        self.position_title = self.position_title.trim().to_string();
        if self.platform != Some(Platform::Otro) {
            self.platform_other = None;
        }
        self
    }
}

/// Partial update. `None` leaves a column alone; for nullable columns
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplicationPatch {
    pub company_name: Option<String>,
    pub position_title: Option<String>,
    pub platform: Option<Platform>,
    pub platform_other: Option<Option<String>>,
    pub application_date: Option<NaiveDate>,
    pub status: Option<ApplicationStatus>,
    pub salary_min: Option<Option<f64>>,
    pub salary_max: Option<Option<f64>>,
    pub salary_currency: Option<Option<SalaryCurrency>>,
    pub salary_period: Option<Option<SalaryPeriod>>,
    pub salary_not_specified: Option<bool>,
    pub location_type: Option<Option<LocationType>>,
    pub location_city: Option<Option<String>>,
    pub job_url: Option<Option<String>>,
    pub personal_notes: Option<Option<String>>,
    pub is_priority: Option<bool>,
}

impl ApplicationPatch {
    pub fn status(status: ApplicationStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        if matches!(&self.company_name, Some(name) if name.trim().is_empty()) {
            return Err(TrackerError::Validation("company name cannot be blank".into()));
        }
        if matches!(&self.position_title, Some(title) if title.trim().is_empty()) {
            return Err(TrackerError::Validation("position title cannot be blank".into()));
        }
        Ok(())
    }

    pub(crate) fn normalized(mut self) -> Self {
        if let Some(name) = self.company_name.as_mut() {
            *name = name.trim().to_string();
        }
        if let Some(title) = self.position_title.as_mut() {
            *title = title.trim().to_string();
        }
        if matches!(self.platform, Some(p) if p != Platform::Otro) {
            self.platform_other = Some(None);
        }
        self
    }
}
