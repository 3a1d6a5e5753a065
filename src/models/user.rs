//! Teacher and student models

use serde::{Deserialize, Serialize};

use crate::api::entities::{blank_fields, Draft, Entity};

/// Teacher account
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub login: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TeacherDraft {
    pub first_name: String,
    pub last_name: String,
    pub login: String,
}

impl Draft for TeacherDraft {
    fn missing_fields(&self) -> Vec<&'static str> {
        blank_fields(&[
            ("firstName", self.first_name.as_str()),
            ("lastName", self.last_name.as_str()),
            ("login", self.login.as_str()),
        ])
    }
}

impl Entity for Teacher {
    type Draft = TeacherDraft;

    const NAME: &'static str = "teacher";
    const TITLE: &'static str = "Teachers";
    const PATH: &'static str = "/teachers";
    const PARTIAL_UPDATE: bool = false;

    fn id(&self) -> i64 {
        self.id
    }

    fn summary(&self) -> String {
        format!(
            "{:<30} {}",
            format!("{} {}", self.first_name, self.last_name),
            self.login
        )
    }
}

/// Student profile
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub status: String,
    pub account_id: Option<i64>,
    pub creator_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StudentDraft {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub status: String,
    #[serde(default)]
    pub account_id: Option<i64>,
    #[serde(default)]
    pub user_id: Option<i64>,
}

impl Draft for StudentDraft {
    fn missing_fields(&self) -> Vec<&'static str> {
        blank_fields(&[
            ("firstName", self.first_name.as_str()),
            ("lastName", self.last_name.as_str()),
            ("phone", self.phone.as_str()),
            ("status", self.status.as_str()),
        ])
    }
}

impl Entity for Student {
    type Draft = StudentDraft;

    const NAME: &'static str = "student";
    const TITLE: &'static str = "Students";
    const PATH: &'static str = "/students";
    const PARENT_KEY: Option<&'static str> = Some("groupId");
    const PARTIAL_UPDATE: bool = true;

    fn id(&self) -> i64 {
        self.id
    }

    fn summary(&self) -> String {
        format!(
            "{:<30} {:<16} {}",
            format!("{} {}", self.first_name, self.last_name),
            self.phone,
            self.status
        )
    }
}
