//! Curriculum Tree
//!
//! 학년 → 과목 → 챕터로 이루어진 정적 커리큘럼. 동기화 범위(학년)를 정할 때만 사용합니다.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::VaultError;

/// 시험 인덱스 전용으로 예약된 학년 값 (레슨 동기화에 사용 불가)
pub const EXAM_INDEX_GRADE: i64 = 0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterNode {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectNode {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub chapters: Vec<ChapterNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeNode {
    pub grade: i64,
    pub title: String,
    #[serde(default)]
    pub subjects: Vec<SubjectNode>,
}

/// 커리큘럼 트리 + chapterId → grade 역색인
#[derive(Debug, Clone, Default)]
pub struct Curriculum {
    grades: Vec<GradeNode>,
    chapter_grade: HashMap<String, i64>,
}

impl Curriculum {
    pub fn new(grades: Vec<GradeNode>) -> Self {
        let mut chapter_grade = HashMap::new();
        for grade in &grades {
            for subject in &grade.subjects {
                for chapter in &subject.chapters {
                    chapter_grade.insert(chapter.id.clone(), grade.grade);
                }
            }
        }
        Self { grades, chapter_grade }
    }

    pub fn from_json(json: &str) -> Result<Self, VaultError> {
        let grades: Vec<GradeNode> = serde_json::from_str(json)?;
        Ok(Self::new(grades))
    }

    pub fn load(path: &Path) -> Result<Self, VaultError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn grades(&self) -> &[GradeNode] {
        &self.grades
    }

    /// 챕터가 속한 학년 (알 수 없는 챕터면 None)
    pub fn grade_of(&self, chapter_id: &str) -> Option<i64> {
        self.chapter_grade.get(chapter_id).copied()
    }

    /// 해당 학년의 챕터 ID 목록 (커리큘럼 순서)
    pub fn chapters_of(&self, grade: i64) -> Vec<&str> {
        self.grades
            .iter()
            .filter(|g| g.grade == grade)
            .flat_map(|g| g.subjects.iter())
            .flat_map(|s| s.chapters.iter())
            .map(|c| c.id.as_str())
            .collect()
    }

    pub fn contains_grade(&self, grade: i64) -> bool {
        self.grades.iter().any(|g| g.grade == grade)
    }
}

#[cfg(test)]
pub(crate) fn sample_curriculum() -> Curriculum {
    Curriculum::from_json(
        r#"[
            {"grade": 3, "title": "3학년", "subjects": [
                {"id": "g3-math", "title": "수학", "chapters": [
                    {"id": "g3-math-1", "title": "덧셈과 뺄셈"},
                    {"id": "g3-math-2", "title": "분수"}
                ]},
                {"id": "g3-sci", "title": "과학", "chapters": [
                    {"id": "g3-sci-1", "title": "물질의 성질"}
                ]}
            ]},
            {"grade": 4, "title": "4학년", "subjects": [
                {"id": "g4-math", "title": "수학", "chapters": [
                    {"id": "g4-math-1", "title": "큰 수"}
                ]}
            ]}
        ]"#,
    )
    .unwrap()
}
