// src/pk_enum.rs
//
// PackageKit enumerations as they travel over D-Bus. Roles and filters are
// bitfields where each enum value `n` sets bit `1 << n`.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    GetRepoList,
    InstallPackages,
    RepoEnable,
    WhatProvides,
}

impl Role {
    pub fn value(self) -> u32 {
        match self {
            Role::GetRepoList => 6,
            Role::InstallPackages => 11,
            Role::RepoEnable => 15,
            Role::WhatProvides => 23,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Role::GetRepoList => "listing software sources",
            Role::InstallPackages => "installing packages",
            Role::RepoEnable => "enabling software sources",
            Role::WhatProvides => "searching for providing packages",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Roles advertised by the daemon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Roles(u64);

impl Roles {
    pub fn empty() -> Self {
        Roles(0)
    }

    pub fn from_bits(bits: u64) -> Self {
        Roles(bits)
    }

    pub fn bits(self) -> u64 {
        self.0
    }

    pub fn contains(self, role: Role) -> bool {
        self.0 & (1u64 << role.value()) != 0
    }

    pub fn insert(&mut self, role: Role) {
        self.0 |= 1u64 << role.value();
    }
}

impl FromIterator<Role> for Roles {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        let mut roles = Roles::empty();
        for role in iter {
            roles.insert(role);
        }
        roles
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    None,
    NotInstalled,
    NotDevelopment,
}

impl Filter {
    pub fn value(self) -> u32 {
        match self {
            Filter::None => 1,
            Filter::NotInstalled => 3,
            Filter::NotDevelopment => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Filters(u64);

impl Filters {
    pub fn bits(self) -> u64 {
        self.0
    }

    pub fn contains(self, filter: Filter) -> bool {
        self.0 & (1u64 << filter.value()) != 0
    }
}

impl From<Filter> for Filters {
    fn from(filter: Filter) -> Self {
        Filters(1u64 << filter.value())
    }
}

/// Transaction flag asking the daemon to refuse untrusted packages.
pub const TRANSACTION_FLAG_ONLY_TRUSTED: u64 = 1 << 1;

/// `info` value of a `Package` signal for an installed package.
pub const INFO_INSTALLED: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Unknown,
    Wait,
    Setup,
    Running,
    Query,
    Info,
    Remove,
    RefreshCache,
    Download,
    Install,
    Update,
    Cleanup,
    DepResolve,
    SigCheck,
    Commit,
    Request,
    Finished,
    Cancel,
    DownloadRepository,
    WaitingForAuth,
    WaitingForLock,
    LoadingCache,
}

impl Status {
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => Status::Wait,
            2 => Status::Setup,
            3 => Status::Running,
            4 => Status::Query,
            5 => Status::Info,
            6 => Status::Remove,
            7 => Status::RefreshCache,
            8 => Status::Download,
            9 => Status::Install,
            10 => Status::Update,
            11 => Status::Cleanup,
            13 => Status::DepResolve,
            14 => Status::SigCheck,
            16 => Status::Commit,
            17 => Status::Request,
            18 => Status::Finished,
            19 => Status::Cancel,
            20 => Status::DownloadRepository,
            27 => Status::LoadingCache,
            30 => Status::WaitingForLock,
            31 => Status::WaitingForAuth,
            _ => Status::Unknown,
        }
    }

    pub fn to_localised_text(self) -> &'static str {
        match self {
            Status::Unknown => "Unknown state",
            Status::Wait => "Waiting in queue",
            Status::Setup => "Starting",
            Status::Running => "Running",
            Status::Query => "Querying",
            Status::Info => "Getting information",
            Status::Remove => "Removing packages",
            Status::RefreshCache => "Refreshing software list",
            Status::Download => "Downloading packages",
            Status::Install => "Installing packages",
            Status::Update => "Updating packages",
            Status::Cleanup => "Cleaning up packages",
            Status::DepResolve => "Resolving dependencies",
            Status::SigCheck => "Checking signatures",
            Status::Commit => "Committing changes",
            Status::Request => "Requesting data",
            Status::Finished => "Finished",
            Status::Cancel => "Cancelling",
            Status::DownloadRepository => "Downloading repository information",
            Status::WaitingForAuth => "Waiting for authentication",
            Status::WaitingForLock => "Waiting for package manager lock",
            Status::LoadingCache => "Loading cache",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Unknown,
    Success,
    Failed,
    Cancelled,
    KeyRequired,
    EulaRequired,
    Killed,
}

impl Exit {
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => Exit::Success,
            2 => Exit::Failed,
            3 => Exit::Cancelled,
            4 => Exit::KeyRequired,
            5 => Exit::EulaRequired,
            6 => Exit::Killed,
            _ => Exit::Unknown,
        }
    }

    pub fn to_localised_text(self) -> &'static str {
        match self {
            Exit::Unknown => "The transaction ended in an unknown state",
            Exit::Success => "The transaction finished",
            Exit::Failed => "The transaction failed",
            Exit::Cancelled => "The transaction was cancelled",
            Exit::KeyRequired => "A signing key needs to be accepted",
            Exit::EulaRequired => "A license agreement needs to be accepted",
            Exit::Killed => "The transaction was killed",
        }
    }
}

/// Readable text for a PackageKit `ErrorCode` value.
pub fn error_code_text(code: u32) -> String {
    let text = match code {
        1 => "The system is out of memory",
        2 => "No network connection was available",
        3 => "The action is not supported by this backend",
        4 => "An internal system error has occurred",
        5 => "A security trust relationship is not present",
        8 => "The package could not be found",
        9 => "The package is already installed",
        10 => "The package download failed",
        13 => "The dependencies could not be resolved",
        16 => "The transaction failed",
        17 => "The transaction was cancelled",
        19 => "The software source could not be found",
        26 => "The package manager lock could not be acquired",
        28 => "The software source configuration could not be written",
        33 => "The software source configuration is invalid",
        37 => "The software source is not available",
        _ => return format!("Unknown error (code {})", code),
    };
    text.to_string()
}
