use indicatif::{ProgressBar, ProgressStyle};

/// エンジン操作 (pull / build / push) のスピナー
///
/// 端末でなければ indicatif が描画を抑止します。
pub struct EngineProgress {
    progress_bar: ProgressBar,
}

impl EngineProgress {
    pub fn new(operation: &str, target: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) =
            ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")
        {
            pb.set_style(style);
        }
        pb.set_message(format!("{} {}...", operation, target));

        Self { progress_bar: pb }
    }

    pub fn set_message(&self, msg: &str) {
        self.progress_bar.set_message(msg.to_string());
    }

    pub fn finish(&self, message: &str) {
        self.progress_bar.finish_with_message(message.to_string());
    }

    pub fn finish_error(&self, error: &str) {
        self.progress_bar
            .abandon_with_message(format!("failed: {}", error));
    }
}
