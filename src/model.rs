// src/model.rs

use std::fmt;

/// One displayed row: a software source or a driver-providing package.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Entry {
    pub id: String,
    pub label: String,
    pub enabled: bool,
    /// Liveness flag, only meaningful while a refresh cycle is running.
    pub seen: bool,
}

impl Entry {
    pub fn new(id: &str, label: &str, enabled: bool) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            enabled,
            seen: true,
        }
    }
}

/// A PackageKit package id, `name;version;arch;data`.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PackageId {
    pub name: String,
    pub version: String,
    pub arch: String,
    pub data: String,
}

impl PackageId {
    pub fn parse(package_id: &str) -> Option<PackageId> {
        let parts: Vec<&str> = package_id.split(';').collect();
        if parts.len() != 4 || parts[0].is_empty() {
            return None;
        }

        Some(PackageId {
            name: parts[0].to_string(),
            version: parts[1].to_string(),
            arch: parts[2].to_string(),
            data: parts[3].to_string(),
        })
    }

    /// Name used in user-facing text; falls back to the raw id when it
    /// is not a well-formed package id.
    pub fn display_name(package_id: &str) -> String {
        PackageId::parse(package_id)
            .map(|id| id.name)
            .unwrap_or_else(|| package_id.to_string())
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.version.is_empty() {
            write!(f, "-{}", self.version)?;
        }
        if !self.arch.is_empty() {
            write!(f, ".{}", self.arch)?;
        }
        Ok(())
    }
}
