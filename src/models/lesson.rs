//! Lesson package and lesson models

use serde::{Deserialize, Serialize};

use crate::api::entities::{blank_fields, Draft, Entity};

/// A named bundle of lessons that courses are built on
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonPackage {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LessonPackageDraft {
    pub name: String,
}

impl Draft for LessonPackageDraft {
    fn missing_fields(&self) -> Vec<&'static str> {
        blank_fields(&[("name", self.name.as_str())])
    }
}

impl Entity for LessonPackage {
    type Draft = LessonPackageDraft;

    const NAME: &'static str = "lesson package";
    const TITLE: &'static str = "Lesson packages";
    const PATH: &'static str = "/lesson-packages";
    const PARTIAL_UPDATE: bool = false;

    fn id(&self) -> i64 {
        self.id
    }

    fn summary(&self) -> String {
        self.name.clone()
    }
}

/// Lesson entity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: i64,
    pub name: String,
    pub package_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LessonDraft {
    pub name: String,
    pub package_id: i64,
}

impl Draft for LessonDraft {
    fn missing_fields(&self) -> Vec<&'static str> {
        blank_fields(&[("name", self.name.as_str())])
    }
}

impl Entity for Lesson {
    type Draft = LessonDraft;

    const NAME: &'static str = "lesson";
    const TITLE: &'static str = "Lessons";
    const PATH: &'static str = "/lessons";
    const PARENT_KEY: Option<&'static str> = Some("packageId");
    const PARTIAL_UPDATE: bool = false;

    fn id(&self) -> i64 {
        self.id
    }

    fn summary(&self) -> String {
        format!("{:<30} package {}", self.name, self.package_id)
    }
}
