use serde::Serialize;

use crate::domains::resumes::models::Resume;

#[derive(Debug, Clone, Serialize)]
pub struct ResumeData {
    pub id: String,
    pub title: String,
    pub content: String,
    pub is_primary: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Resume> for ResumeData {
    fn from(resume: Resume) -> Self {
        Self {
            id: resume.id.to_string(),
            title: resume.title,
            content: resume.content,
            is_primary: resume.is_primary,
            created_at: resume.created_at.to_rfc3339(),
            updated_at: resume.updated_at.to_rfc3339(),
        }
    }
}
