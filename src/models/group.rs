//! Group and group membership models

use serde::{Deserialize, Serialize};

use crate::api::entities::{blank_fields, Draft, Entity};

/// Group entity: a course taught by one teacher
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub course_id: i64,
    pub teacher_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GroupDraft {
    pub name: String,
    pub course_id: i64,
    pub teacher_id: i64,
}

impl Draft for GroupDraft {
    fn missing_fields(&self) -> Vec<&'static str> {
        blank_fields(&[("name", self.name.as_str())])
    }
}

impl Entity for Group {
    type Draft = GroupDraft;

    const NAME: &'static str = "group";
    const TITLE: &'static str = "Groups";
    const PATH: &'static str = "/groups";
    const PARENT_KEY: Option<&'static str> = Some("courseId");
    const PARTIAL_UPDATE: bool = true;

    fn id(&self) -> i64 {
        self.id
    }

    fn summary(&self) -> String {
        format!(
            "{:<30} course {:<6} teacher {}",
            self.name, self.course_id, self.teacher_id
        )
    }
}

/// Student's membership in a group, valid until `expired_at`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentGroup {
    pub id: i64,
    pub group_id: i64,
    pub student_id: i64,
    pub creator_id: Option<i64>,
    pub expired_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StudentGroupDraft {
    pub group_id: i64,
    pub student_id: i64,
    pub expired_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator_id: Option<i64>,
}

impl Draft for StudentGroupDraft {
    fn missing_fields(&self) -> Vec<&'static str> {
        blank_fields(&[("expiredAt", self.expired_at.as_str())])
    }
}

impl Entity for StudentGroup {
    type Draft = StudentGroupDraft;

    const NAME: &'static str = "student group";
    const TITLE: &'static str = "Student groups";
    const PATH: &'static str = "/student-groups";
    const PARENT_KEY: Option<&'static str> = Some("groupId");
    const PARTIAL_UPDATE: bool = false;

    fn id(&self) -> i64 {
        self.id
    }

    fn summary(&self) -> String {
        format!(
            "student {:<6} group {:<6} until {}",
            self.student_id, self.group_id, self.expired_at
        )
    }
}
