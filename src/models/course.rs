//! Course models

use serde::{Deserialize, Serialize};

use crate::api::entities::{blank_fields, Draft, Entity};

/// Course entity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: i64,
    pub name: String,
    pub program_lang: String,
    pub package_id: i64,
}

/// Course create payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CourseDraft {
    pub name: String,
    pub program_lang: String,
    pub package_id: i64,
}

impl Draft for CourseDraft {
    fn missing_fields(&self) -> Vec<&'static str> {
        blank_fields(&[
            ("name", self.name.as_str()),
            ("programLang", self.program_lang.as_str()),
        ])
    }
}

impl Entity for Course {
    type Draft = CourseDraft;

    const NAME: &'static str = "course";
    const TITLE: &'static str = "Courses";
    const PATH: &'static str = "/courses";
    const PARTIAL_UPDATE: bool = true;

    fn id(&self) -> i64 {
        self.id
    }

    fn summary(&self) -> String {
        format!(
            "{:<30} {:<12} package {}",
            self.name, self.program_lang, self.package_id
        )
    }
}
