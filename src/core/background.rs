//! 后台能力：下载日志与后台委托
//!
//! 本进程没有系统级的后台传输守护，「后台会话」指的是：未完成的下载
//! 记录在以会话标识命名的日志文件里，进程重启后重放为续传任务，
//! 完成结果送往后台委托而非原调用方（原调用早已不在）。

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::HttpError;
use super::transport::{ResumeData, TaskId};

/// 后台会话的任务完成委托
#[async_trait(?Send)]
pub trait BackgroundDelegate {
    async fn on_task_complete(&self, id: TaskId, data: Option<Bytes>, error: Option<HttpError>);
    /// 日志里最后一个重放任务完成后触发一次
    async fn on_session_finished(&self);
}

/// 后台会话的下载落盘委托
#[async_trait(?Send)]
pub trait BackgroundDownloadDelegate {
    async fn on_download_finished(&self, id: TaskId, location: PathBuf);
}

/// 日志条目：一个尚未完成的下载
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub key: Uuid,
    pub url: String,
    pub temp_path: PathBuf,
}

impl JournalEntry {
    /// 按落盘文件的当前大小生成续传信息
    pub fn resume_data(&self) -> ResumeData {
        let bytes_written = fs::metadata(&self.temp_path).map(|m| m.len()).unwrap_or(0);
        ResumeData {
            url: self.url.clone(),
            temp_path: self.temp_path.clone(),
            bytes_written,
            etag: None,
        }
    }
}

/// 下载日志：后台会话的持久化账本
pub struct DownloadJournal {
    path: PathBuf,
    entries: Vec<JournalEntry>,
}

impl DownloadJournal {
    /// 打开（或新建）标识对应的日志文件
    pub fn open(dir: &Path, identifier: &str) -> Self {
        let path = dir.join(format!("{}.journal.json", identifier));
        let entries = fs::read_to_string(&path)
            .ok()
            .and_then(|data| serde_json::from_str::<Vec<JournalEntry>>(&data).ok())
            .unwrap_or_default();
        Self { path, entries }
    }

    pub fn add(&mut self, url: String, temp_path: PathBuf) -> Uuid {
        let key = Uuid::new_v4();
        self.entries.push(JournalEntry { key, url, temp_path });
        self.save();
        key
    }

    pub fn remove(&mut self, key: Uuid) {
        self.entries.retain(|e| e.key != key);
        self.save();
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn save(&self) {
        if let Ok(json) = serde_json::to_string_pretty(&self.entries) {
            if let Some(parent) = self.path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            let _ = fs::File::create(&self.path).and_then(|mut f| f.write_all(json.as_bytes()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("netkit-journal-tests").join(name);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_journal_persists_across_reopen() {
        let dir = temp_dir("persist");
        let mut journal = DownloadJournal::open(&dir, "bg");
        assert!(journal.is_empty());

        let key = journal.add(
            "http://example.com/a.bin".to_string(),
            dir.join("a.part"),
        );
        journal.add("http://example.com/b.bin".to_string(), dir.join("b.part"));

        let reopened = DownloadJournal::open(&dir, "bg");
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.entries()[0].key, key);
        assert_eq!(reopened.entries()[0].url, "http://example.com/a.bin");
    }

    #[test]
    fn test_journal_remove() {
        let dir = temp_dir("remove");
        let mut journal = DownloadJournal::open(&dir, "bg");
        let key = journal.add("http://example.com/x".to_string(), dir.join("x.part"));
        journal.remove(key);
        assert!(journal.is_empty());
        assert!(DownloadJournal::open(&dir, "bg").is_empty());
    }

    #[test]
    fn test_resume_data_counts_existing_bytes() {
        let dir = temp_dir("resume");
        let part = dir.join("partial.part");
        fs::write(&part, b"0123456789").unwrap();
        let entry = JournalEntry {
            key: Uuid::new_v4(),
            url: "http://example.com/big".to_string(),
            temp_path: part,
        };
        let resume = entry.resume_data();
        assert_eq!(resume.bytes_written, 10);
    }
}
