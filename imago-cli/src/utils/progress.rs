use imago_engine::DownloadProgress;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio::sync::watch;

fn download_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} {msg}\n[{elapsed_precise}] [{bar:40.green/white}] {bytes}/{total_bytes} @ {bytes_per_sec}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

#[derive(Clone)]
pub struct ProgressManager {
    multi: MultiProgress,
    disabled: bool,
}

impl ProgressManager {
    pub fn new(multi: MultiProgress) -> Self {
        Self {
            multi,
            disabled: false,
        }
    }

    pub fn new_disabled(multi: MultiProgress) -> Self {
        Self {
            multi,
            disabled: true,
        }
    }

    /// Follow the progress of one download until its record goes away
    pub fn track(&self, label: &str, mut progress: watch::Receiver<DownloadProgress>) {
        if self.disabled {
            return;
        }

        let bar = self.multi.add(ProgressBar::new(0));
        bar.set_style(download_style());
        bar.set_message(format!("Downloading {label}"));
        bar.enable_steady_tick(Duration::from_millis(500));

        let label = label.to_owned();
        tokio::spawn(async move {
            // Errors once every sender is gone, i.e. the download ended
            while progress.changed().await.is_ok() {
                let current = *progress.borrow_and_update();
                if let Some(total) = current.expected {
                    bar.set_length(total);
                }
                bar.set_position(current.received);
            }
            bar.finish_with_message(format!("Finished {label}"));
        });
    }
}
