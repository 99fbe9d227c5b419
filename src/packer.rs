//! Archive Packer
//!
//! PayloadUnit 목록을 크기 제한이 있는 압축 아카이브 파트로 나눕니다.
//!
//! - 크기 기준: 각 유닛의 "직렬화 + 난독화" 문자열 바이트 수 (압축 전)
//! - 입력 순서를 유지하는 단일 패스 greedy 방식
//! - 제한보다 큰 유닛 하나는 단독 파트가 됨 (버리거나 쪼개지 않음)

use std::io::{Cursor, Read, Write};

use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::codec::{deobfuscate, obfuscate};
use crate::error::VaultError;
use crate::models::PayloadUnit;

/// Deflate 압축 레벨 (속도 우선)
const COMPRESSION_LEVEL: i64 = 3;

/// 아카이브에 들어갈 엔트리 하나 (이미 난독화됨)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedEntry {
    pub name: String,
    pub content: String,
}

/// 압축 직전의 파트 (봉인된 누적기)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveBatch {
    pub entries: Vec<PackedEntry>,
    /// 압축 전 콘텐츠 바이트 합
    pub content_bytes: usize,
}

impl ArchiveBatch {
    fn push(&mut self, entry: PackedEntry) {
        self.content_bytes += entry.content.len();
        self.entries.push(entry);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// greedy first-fit-in-order 패킹
pub fn pack_units(units: &[PayloadUnit], ceiling: usize) -> Result<Vec<ArchiveBatch>, VaultError> {
    let mut batches = Vec::new();
    let mut current = ArchiveBatch::default();

    for (index, unit) in units.iter().enumerate() {
        let json = serde_json::to_string(unit)?;
        let entry = PackedEntry {
            name: format!("unit_{:05}.json", index),
            content: obfuscate(&json),
        };
        let size = entry.content.len();

        if !current.is_empty() && current.content_bytes + size > ceiling {
            debug!(
                "[Packer] Sealing part {} ({} entries, {} bytes)",
                batches.len() + 1,
                current.entries.len(),
                current.content_bytes
            );
            batches.push(std::mem::take(&mut current));
        }
        current.push(entry);
    }

    if !current.is_empty() {
        batches.push(current);
    }

    Ok(batches)
}

/// 파트를 zip 바이트로 압축
pub fn compress_batch(batch: &ArchiveBatch) -> Result<Vec<u8>, VaultError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(COMPRESSION_LEVEL))
        .large_file(batch.content_bytes > u32::MAX as usize);

    for entry in &batch.entries {
        writer.start_file(entry.name.as_str(), options)?;
        writer.write_all(entry.content.as_bytes())?;
    }

    Ok(writer.finish()?.into_inner())
}

/// zip 바이트 → PayloadUnit 목록 (아카이브에 기록된 순서)
pub fn unpack_archive(bytes: &[u8]) -> Result<Vec<PayloadUnit>, VaultError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| VaultError::Format(format!("not a zip archive: {}", e)))?;

    let mut units = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        if file.is_dir() {
            continue;
        }
        let name = file.name().to_string();
        let mut text = String::new();
        file.read_to_string(&mut text)
            .map_err(|e| VaultError::Format(format!("entry {} is not text: {}", name, e)))?;

        let plain = deobfuscate(&text);
        let unit: PayloadUnit = serde_json::from_str(&plain)
            .map_err(|e| VaultError::Format(format!("entry {} is not a payload unit: {}", name, e)))?;
        units.push(unit);
    }

    Ok(units)
}
