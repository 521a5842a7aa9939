//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::BTreeSet;

use sift::Entity;

#[derive(Debug, Clone, PartialEq, Entity)]
pub struct Permission {
    pub id: i64,
    pub name: String,
    pub level: Option<i32>,
    pub roles: BTreeSet<i64>,
    pub active: bool,
    #[sift(skip)]
    pub note: String,
}

impl Permission {
    pub fn new(id: i64, name: &str, level: Option<i32>, roles: &[i64]) -> Self {
        Self {
            id,
            name: name.to_string(),
            level,
            roles: roles.iter().copied().collect(),
            active: true,
            note: String::new(),
        }
    }
}

#[derive(Debug, Clone, Entity)]
#[sift(name = "Grant")]
pub struct Grant {
    pub grantee: String,
    #[sift(skip)]
    pub permission: Permission,
}

/// Nine permissions; four names contain "can".
pub fn permissions() -> Vec<Permission> {
    let mut rows = vec![
        Permission::new(1, "canEditUser", Some(3), &[1, 2]),
        Permission::new(2, "canViewUser", Some(1), &[1]),
        Permission::new(3, "canDeleteUser", Some(5), &[2]),
        Permission::new(4, "canExport", None, &[]),
        Permission::new(5, "readReports", Some(1), &[3]),
        Permission::new(6, "writeReports", Some(2), &[3, 4]),
        Permission::new(7, "manageBilling", Some(4), &[]),
        Permission::new(8, "viewAudit", Some(2), &[4]),
        Permission::new(9, "Administer", Some(5), &[1, 2, 3, 4]),
    ];
    rows[6].active = false;
    rows
}

pub fn ids<'a>(rows: impl IntoIterator<Item = &'a Permission>) -> Vec<i64> {
    rows.into_iter().map(|p| p.id).collect()
}
