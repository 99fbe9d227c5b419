//! Content Model
//!
//! 레슨/첨부 파일의 로컬 상태. `lessons`, `files` 두 키에 전체 상태를 JSON으로 보관하며
//! 모든 변경은 이 모듈의 메서드를 통해서만 이루어집니다.
//!
//! 읽기 → 병합 → 쓰기 구간은 `edit_lock` 으로 직렬화됩니다.
//! (복원 병합과 로컬 편집이 겹쳐도 중간 상태가 기록되지 않음)

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::Rng;
use tokio::sync::Mutex;
use tracing::debug;

use crate::curriculum::Curriculum;
use crate::db::{ContentStore, FILES_KEY, LESSONS_KEY};
use crate::error::VaultError;
use crate::models::{AttachedFile, FileCategory, FileMap, LessonRecord, PayloadUnit};

/// 로컬 상태 스냅샷
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalState {
    pub lessons: Vec<LessonRecord>,
    pub files: FileMap,
}

pub struct ContentModel {
    store: Arc<dyn ContentStore>,
    edit_lock: Mutex<()>,
}

impl ContentModel {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self {
            store,
            edit_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    /// 저장소에서 현재 상태 로드 (키가 없으면 빈 상태)
    pub fn load(&self) -> Result<LocalState, VaultError> {
        let lessons = match self.store.get(LESSONS_KEY)? {
            Some(raw) => serde_json::from_slice(&raw)?,
            None => Vec::new(),
        };
        let files = match self.store.get(FILES_KEY)? {
            Some(raw) => serde_json::from_slice(&raw)?,
            None => BTreeMap::new(),
        };
        Ok(LocalState { lessons, files })
    }

    fn save(&self, state: &LocalState) -> Result<(), VaultError> {
        let lessons = serde_json::to_vec(&state.lessons)?;
        let files = serde_json::to_vec(&state.files)?;
        self.store
            .put_many(&[(LESSONS_KEY, lessons), (FILES_KEY, files)])
    }

    /// 잠금 상태에서 읽기 → 변경 → 쓰기
    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut LocalState) -> Result<T, VaultError>,
    ) -> Result<T, VaultError> {
        let _guard = self.edit_lock.lock().await;
        let mut state = self.load()?;
        let out = f(&mut state)?;
        self.save(&state)?;
        Ok(out)
    }

    pub fn lessons(&self) -> Result<Vec<LessonRecord>, VaultError> {
        Ok(self.load()?.lessons)
    }

    pub fn files_for(&self, target_id: &str) -> Result<Vec<AttachedFile>, VaultError> {
        Ok(self.load()?.files.remove(target_id).unwrap_or_default())
    }

    /// 레슨 생성
    pub async fn add_lesson(&self, chapter_id: &str, name: &str) -> Result<LessonRecord, VaultError> {
        if name.trim().is_empty() {
            return Err(VaultError::InvalidOperation("Lesson name cannot be empty".to_string()));
        }

        let now = chrono::Utc::now().timestamp_millis();
        let lesson = LessonRecord {
            id: generate_lesson_id(now),
            chapter_id: chapter_id.to_string(),
            name: name.trim().to_string(),
            created_at: now,
        };

        let record = lesson.clone();
        self.mutate(move |state| {
            state.lessons.push(record);
            Ok(())
        })
        .await?;

        debug!("[Content] Lesson created: {} ({})", lesson.id, lesson.chapter_id);
        Ok(lesson)
    }

    /// 레슨 삭제 (첨부 파일까지 함께 삭제)
    pub async fn delete_lesson(&self, lesson_id: &str) -> Result<(), VaultError> {
        self.mutate(|state| {
            let before = state.lessons.len();
            state.lessons.retain(|l| l.id != lesson_id);
            if state.lessons.len() == before {
                return Err(VaultError::NotFound(format!("lesson {}", lesson_id)));
            }
            state.files.remove(lesson_id);
            Ok(())
        })
        .await
    }

    /// 파일 첨부 (레슨 또는 챕터에)
    pub async fn attach_file(
        &self,
        target_id: &str,
        name: &str,
        mime_type: &str,
        bytes: &[u8],
        category: Option<FileCategory>,
    ) -> Result<AttachedFile, VaultError> {
        let file = AttachedFile {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            size_bytes: bytes.len() as u64,
            uploaded_at: chrono::Utc::now().timestamp_millis(),
            content: encode_data_url(mime_type, bytes),
            category,
        };

        let record = file.clone();
        self.mutate(move |state| {
            state.files.entry(target_id.to_string()).or_default().push(record);
            Ok(())
        })
        .await?;

        Ok(file)
    }

    /// 첨부 파일 개별 삭제
    pub async fn delete_file(&self, target_id: &str, file_id: &str) -> Result<(), VaultError> {
        self.mutate(|state| {
            let list = state
                .files
                .get_mut(target_id)
                .ok_or_else(|| VaultError::NotFound(format!("files for {}", target_id)))?;
            let before = list.len();
            list.retain(|f| f.id != file_id);
            if list.len() == before {
                return Err(VaultError::NotFound(format!("file {}", file_id)));
            }
            if list.is_empty() {
                state.files.remove(target_id);
            }
            Ok(())
        })
        .await
    }

    /// 학년 단위 동기화 묶음 생성
    ///
    /// 레슨마다 1개 (레슨 파일 포함), 그 다음 레슨이 소유하지 않은 챕터 파일 버킷마다 1개.
    pub fn units_for_grade(
        &self,
        curriculum: &Curriculum,
        grade: i64,
    ) -> Result<Vec<PayloadUnit>, VaultError> {
        let state = self.load()?;
        Ok(build_units(&state, curriculum, grade))
    }

    /// 복원 결과로 해당 학년 범위를 통째로 교체
    ///
    /// 다른 학년의 데이터는 유지됩니다.
    pub async fn replace_grade_scope(
        &self,
        curriculum: &Curriculum,
        grade: i64,
        lessons: Vec<LessonRecord>,
        files: FileMap,
    ) -> Result<(), VaultError> {
        self.mutate(move |state| {
            let chapters: HashSet<&str> = curriculum.chapters_of(grade).into_iter().collect();
            let incoming: HashSet<&str> = lessons.iter().map(|l| l.id.as_str()).collect();

            let mut removed: HashSet<String> = HashSet::new();
            state.lessons.retain(|l| {
                let in_scope = chapters.contains(l.chapter_id.as_str()) || incoming.contains(l.id.as_str());
                if in_scope {
                    removed.insert(l.id.clone());
                }
                !in_scope
            });
            state.files.retain(|target, _| {
                !removed.contains(target) && !chapters.contains(target.as_str()) && !files.contains_key(target)
            });

            state.lessons.extend(lessons.iter().cloned());
            for (target, list) in &files {
                state.files.insert(target.clone(), list.clone());
            }
            Ok(())
        })
        .await
    }

    /// 가져오기용 id 합집합 병합 (기존 레코드는 삭제하지 않음)
    pub async fn merge_union(
        &self,
        lessons: Vec<LessonRecord>,
        files: FileMap,
    ) -> Result<(usize, usize), VaultError> {
        self.mutate(move |state| {
            let mut lesson_count = 0;
            for lesson in lessons {
                upsert_lesson(&mut state.lessons, lesson);
                lesson_count += 1;
            }

            let mut file_count = 0;
            for (target, incoming) in files {
                let list = state.files.entry(target).or_default();
                for file in incoming {
                    match list.iter_mut().find(|f| f.id == file.id) {
                        Some(existing) => *existing = file,
                        None => list.push(file),
                    }
                    file_count += 1;
                }
            }
            Ok((lesson_count, file_count))
        })
        .await
    }
}

/// 같은 id 가 있으면 그 자리를 덮어쓰고, 없으면 뒤에 추가
pub(crate) fn upsert_lesson(lessons: &mut Vec<LessonRecord>, lesson: LessonRecord) {
    match lessons.iter_mut().find(|l| l.id == lesson.id) {
        Some(existing) => *existing = lesson,
        None => lessons.push(lesson),
    }
}

fn build_units(state: &LocalState, curriculum: &Curriculum, grade: i64) -> Vec<PayloadUnit> {
    let chapters = curriculum.chapters_of(grade);
    let chapter_set: HashSet<&str> = chapters.iter().copied().collect();
    let mut units = Vec::new();

    // 챕터 순서 → 레슨 생성 순서로 정렬해 재실행 시 결정적인 결과를 보장
    let order: HashMap<&str, usize> = chapters.iter().enumerate().map(|(i, c)| (*c, i)).collect();
    let mut lessons: Vec<&LessonRecord> = state
        .lessons
        .iter()
        .filter(|l| chapter_set.contains(l.chapter_id.as_str()))
        .collect();
    lessons.sort_by_key(|l| order.get(l.chapter_id.as_str()).copied().unwrap_or(usize::MAX));

    for lesson in lessons {
        let mut files = FileMap::new();
        if let Some(list) = state.files.get(&lesson.id) {
            if !list.is_empty() {
                files.insert(lesson.id.clone(), list.clone());
            }
        }
        units.push(PayloadUnit {
            chapter_id: lesson.chapter_id.clone(),
            lessons: vec![lesson.clone()],
            files,
        });
    }

    for chapter in chapters {
        if let Some(list) = state.files.get(chapter) {
            if list.is_empty() {
                continue;
            }
            let mut files = FileMap::new();
            files.insert(chapter.to_string(), list.clone());
            units.push(PayloadUnit {
                chapter_id: chapter.to_string(),
                lessons: Vec::new(),
                files,
            });
        }
    }

    units
}

/// `<timestamp>-<random>` 형식의 레슨 ID
fn generate_lesson_id(now_ms: i64) -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..6)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("{}-{}", now_ms, suffix)
}

/// 바이트 → data URL
pub fn encode_data_url(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, BASE64.encode(bytes))
}

/// data URL → (MIME, 바이트)
pub fn decode_data_url(url: &str) -> Result<(String, Vec<u8>), VaultError> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| VaultError::Format("data URL must start with 'data:'".to_string()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| VaultError::Format("data URL has no payload".to_string()))?;
    let mime = meta.strip_suffix(";base64").ok_or_else(|| {
        VaultError::Format("only base64 data URLs are supported".to_string())
    })?;
    let bytes = BASE64
        .decode(payload)
        .map_err(|e| VaultError::Format(format!("invalid data URL payload: {}", e)))?;
    Ok((mime.to_string(), bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curriculum::sample_curriculum;
    use crate::db::MemoryStore;

    fn model() -> ContentModel {
        ContentModel::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_delete_lesson_cascades_files() {
        let m = model();
        let lesson = m.add_lesson("g3-math-1", "덧셈").await.unwrap();
        m.attach_file(&lesson.id, "a.pdf", "application/pdf", b"%PDF", None).await.unwrap();
        m.attach_file("g3-math-1", "chapter.png", "image/png", b"png", None).await.unwrap();

        m.delete_lesson(&lesson.id).await.unwrap();

        let state = m.load().unwrap();
        assert!(state.lessons.is_empty());
        assert!(!state.files.contains_key(&lesson.id));
        assert_eq!(state.files["g3-math-1"].len(), 1);
    }

    #[tokio::test]
    async fn test_attach_preserves_insertion_order() {
        let m = model();
        let first = m.attach_file("c1", "1.txt", "text/plain", b"1", None).await.unwrap();
        let second = m.attach_file("c1", "2.txt", "text/plain", b"22", Some(FileCategory::Summary)).await.unwrap();

        let files = m.files_for("c1").unwrap();
        assert_eq!(files.iter().map(|f| f.id.as_str()).collect::<Vec<_>>(), vec![first.id.as_str(), second.id.as_str()]);
        assert_eq!(files[1].size_bytes, 2);

        m.delete_file("c1", &first.id).await.unwrap();
        assert_eq!(m.files_for("c1").unwrap().len(), 1);
        assert!(matches!(m.delete_file("c1", "nope").await, Err(VaultError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_units_for_grade() {
        let m = model();
        let c = sample_curriculum();
        let l1 = m.add_lesson("g3-sci-1", "물질").await.unwrap();
        let l2 = m.add_lesson("g3-math-1", "덧셈").await.unwrap();
        m.add_lesson("g4-math-1", "큰 수").await.unwrap();
        m.attach_file(&l1.id, "a.txt", "text/plain", b"a", None).await.unwrap();
        m.attach_file("g3-math-2", "chapter.txt", "text/plain", b"c", None).await.unwrap();

        let units = m.units_for_grade(&c, 3).unwrap();
        assert_eq!(units.len(), 3);
        // 커리큘럼 순서: g3-math-1 레슨 → g3-sci-1 레슨 → 챕터 버킷
        assert_eq!(units[0].lessons[0].id, l2.id);
        assert_eq!(units[1].lessons[0].id, l1.id);
        assert_eq!(units[1].file_count(), 1);
        assert!(units[2].lessons.is_empty());
        assert!(units[2].files.contains_key("g3-math-2"));

        assert!(m.units_for_grade(&c, 9).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replace_grade_scope_keeps_other_grades() {
        let m = model();
        let c = sample_curriculum();
        let old = m.add_lesson("g3-math-1", "old").await.unwrap();
        let other = m.add_lesson("g4-math-1", "keep").await.unwrap();
        m.attach_file(&old.id, "old.txt", "text/plain", b"o", None).await.unwrap();

        let incoming = LessonRecord {
            id: "1-new".to_string(),
            chapter_id: "g3-math-2".to_string(),
            name: "new".to_string(),
            created_at: 1,
        };
        m.replace_grade_scope(&c, 3, vec![incoming.clone()], FileMap::new()).await.unwrap();

        let state = m.load().unwrap();
        assert_eq!(state.lessons, vec![other, incoming]);
        assert!(!state.files.contains_key(&old.id));
    }

    #[tokio::test]
    async fn test_merge_union_never_deletes() {
        let m = model();
        let kept = m.add_lesson("g3-math-1", "kept").await.unwrap();
        let mut renamed = kept.clone();
        renamed.name = "renamed".to_string();
        let added = LessonRecord {
            id: "2-added".to_string(),
            chapter_id: "g3-math-2".to_string(),
            name: "added".to_string(),
            created_at: 2,
        };

        let (lessons, files) = m.merge_union(vec![renamed, added], FileMap::new()).await.unwrap();
        assert_eq!((lessons, files), (2, 0));

        let state = m.load().unwrap();
        assert_eq!(state.lessons.len(), 2);
        assert_eq!(state.lessons[0].name, "renamed");
    }

    #[test]
    fn test_data_url_roundtrip_and_errors() {
        let url = encode_data_url("image/png", &[0x89, 0x50, 0x4e, 0x47]);
        assert!(url.starts_with("data:image/png;base64,"));
        let (mime, bytes) = decode_data_url(&url).unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(bytes, vec![0x89, 0x50, 0x4e, 0x47]);
        assert!(decode_data_url("http://example.com/a.png").is_err());
        assert!(decode_data_url("data:text/plain,hello").is_err());
    }

    #[test]
    fn test_lesson_id_format() {
        let id = generate_lesson_id(1_700_000_000_123);
        let (ts, suffix) = id.split_once('-').unwrap();
        assert_eq!(ts, "1700000000123");
        assert_eq!(suffix.len(), 6);
    }
}
