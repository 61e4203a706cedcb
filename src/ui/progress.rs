use indicatif::{ProgressBar, ProgressStyle};

use crate::core::registry::ProgressSink;

// 结构体：ProgressReporter
// 把会话的进度回调接到终端进度条上
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    pub fn new(message: &str) -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{msg} [{bar:30}] {bytes}/{total_bytes} {bytes_per_sec} ETA:{eta}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar.set_message(message.to_string());
        Self { bar }
    }

    /// 交给会话的进度回调。预期总量未知(-1)时只滚动计数
    pub fn sink(&self) -> ProgressSink {
        let bar = self.bar.clone();
        Box::new(move |_bytes, total, expected| {
            if expected >= 0 {
                bar.set_length(expected as u64);
            }
            bar.set_position(total.max(0) as u64);
        })
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
