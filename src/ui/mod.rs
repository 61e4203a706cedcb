mod progress;

use std::fmt;
use std::time::Duration;

pub use progress::ProgressReporter;

pub fn print_success(message: &str) {
    println!("✓ {}", message);
}

pub fn print_error(message: &str) {
    eprintln!("✗ {}", message);
}

/// 一次传输结束后的摘要
pub struct TransferSummary {
    pub url: String,
    pub status: u16,
    pub bytes: u64,
    pub elapsed: Duration,
}

impl fmt::Display for TransferSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n传输摘要:")?;
        writeln!(f, "地址: {}", self.url)?;
        writeln!(f, "状态码: {}", self.status)?;
        writeln!(f, "大小: {}", format_size(self.bytes))?;
        writeln!(f, "耗时: {:.2}秒", self.elapsed.as_secs_f64())?;
        Ok(())
    }
}

fn format_size(size: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512.00 B");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
    }
}
