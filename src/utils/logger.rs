use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use actix::prelude::*;
use chrono::Local;
use log::LevelFilter;

/// 一条待写入的日志
pub struct Record {
    pub level: LevelFilter,
    pub line: String,
}
impl Message for Record { type Result = (); }

/// 文件日志 Actor：会话生命周期的持久记录，按大小轮转
///
/// 单独成 Actor 是为了让磁盘写入不落在会话线程上。
pub struct LoggerActor {
    writer: BufWriter<File>,
    level: LevelFilter,
    path: PathBuf,
    rotate_at: u64,
    written: u64,
}

impl LoggerActor {
    pub fn new(
        path: impl Into<PathBuf>,
        level: LevelFilter,
        rotate_at: u64,
    ) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let written = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { writer: BufWriter::new(file), level, path, rotate_at, written })
    }

    /// 超过上限就把当前文件挪成 `.old`，只保留一代
    fn rotate_if_needed(&mut self) -> std::io::Result<()> {
        if self.written <= self.rotate_at {
            return Ok(());
        }
        self.writer.flush()?;
        let mut rotated = self.path.clone().into_os_string();
        rotated.push(".old");
        let rotated = PathBuf::from(rotated);
        if rotated.exists() {
            std::fs::remove_file(&rotated)?;
        }
        std::fs::rename(&self.path, &rotated)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.written = 0;
        Ok(())
    }

    fn append(&mut self, level: LevelFilter, line: &str) -> std::io::Result<()> {
        if level > self.level {
            return Ok(());
        }
        self.rotate_if_needed()?;
        let entry = format!(
            "{} [{}] {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            level,
            line
        );
        self.writer.write_all(entry.as_bytes())?;
        self.written += entry.len() as u64;
        self.writer.flush()?;
        Ok(())
    }
}

impl Actor for LoggerActor {
    type Context = Context<Self>;
}

impl Handler<Record> for LoggerActor {
    type Result = ();

    fn handle(&mut self, msg: Record, _ctx: &mut Self::Context) {
        if let Err(e) = self.append(msg.level, &msg.line) {
            eprintln!("日志写入失败: {}", e);
        }
    }
}

/// Addr<LoggerActor> 的便捷扩展
pub trait SessionLog {
    fn info(&self, line: &str);
    fn warn(&self, line: &str);
    fn error(&self, line: &str);
}

impl SessionLog for Addr<LoggerActor> {
    fn info(&self, line: &str) {
        self.do_send(Record { level: LevelFilter::Info, line: line.to_string() });
    }

    fn warn(&self, line: &str) {
        self.do_send(Record { level: LevelFilter::Warn, line: line.to_string() });
    }

    fn error(&self, line: &str) {
        self.do_send(Record { level: LevelFilter::Error, line: line.to_string() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_log(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("netkit-logger-tests").join(name);
        let _ = std::fs::remove_dir_all(&dir);
        dir.join("session.log")
    }

    #[test]
    fn test_append_respects_level() {
        let path = temp_log("level");
        let mut logger = LoggerActor::new(&path, LevelFilter::Warn, 1024 * 1024).unwrap();
        logger.append(LevelFilter::Info, "被过滤").unwrap();
        logger.append(LevelFilter::Error, "被记录").unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("被过滤"));
        assert!(content.contains("被记录"));
    }

    #[test]
    fn test_rotation_keeps_one_generation() {
        let path = temp_log("rotate");
        let mut logger = LoggerActor::new(&path, LevelFilter::Info, 8).unwrap();
        logger.append(LevelFilter::Info, "第一批内容超过八个字节").unwrap();
        logger.append(LevelFilter::Info, "第二批触发轮转").unwrap();
        let rotated = PathBuf::from(format!("{}.old", path.display()));
        assert!(rotated.exists());
        let fresh = std::fs::read_to_string(&path).unwrap();
        assert!(fresh.contains("第二批触发轮转"));
    }
}
