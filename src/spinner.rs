use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Create a spinner with consistent styling.
fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.enable_steady_tick(Duration::from_millis(120));
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
        .template("{spinner:.blue} {msg} ({elapsed})")
    {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb
}

/// Block for `duration` while showing a spinner.
pub fn wait(msg: &str, duration: Duration) {
    if duration.is_zero() {
        return;
    }
    let pb = create_spinner(msg);
    std::thread::sleep(duration);
    pb.finish_with_message(format!("✔ {}", msg));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn zero_wait_returns_immediately() {
        let start = Instant::now();
        wait("settling", Duration::ZERO);
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn wait_blocks_for_duration() {
        let start = Instant::now();
        wait("settling", Duration::from_millis(30));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
