use indicatif::{ProgressBar, ProgressStyle};

/// A progress bar over the batches of a pass, hidden when `enabled` is false.
pub(super) fn pass_bar(len: usize, label: &str, enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(len as u64);
    let style = ProgressStyle::default_bar()
        .template("{prefix:>5} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ETA:{eta} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb.set_prefix(label.to_string());
    pb
}
