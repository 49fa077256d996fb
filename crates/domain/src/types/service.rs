//! Service identity

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable key naming one external service identity ("crm", "books", ...)
///
/// Ids are normalised to lowercase so configuration keys, environment
/// variables and call sites agree regardless of casing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceId(String);

impl ServiceId {
    /// CRM service name
    pub const CRM: &'static str = "crm";
    /// Books service name
    pub const BOOKS: &'static str = "books";
    /// Projects service name
    pub const PROJECTS: &'static str = "projects";
    /// WorkDrive service name
    pub const WORKDRIVE: &'static str = "workdrive";

    /// Normalised id
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().trim().to_ascii_lowercase())
    }

    /// CRM service
    pub fn crm() -> Self {
        Self::new(Self::CRM)
    }

    /// Books service
    pub fn books() -> Self {
        Self::new(Self::BOOKS)
    }

    /// Projects service
    pub fn projects() -> Self {
        Self::new(Self::PROJECTS)
    }

    /// WorkDrive service
    pub fn workdrive() -> Self {
        Self::new(Self::WORKDRIVE)
    }

    /// Lowercase id
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Upper-case form used in environment variable names
    pub fn env_key(&self) -> String {
        self.0.to_ascii_uppercase().replace(['-', '.'], "_")
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServiceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ServiceId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for ServiceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ServiceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}
