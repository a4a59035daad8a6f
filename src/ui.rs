// Terminal output helpers for command results

use colored::Colorize;

/// Width of the traffic share bar in cells
const BAR_WIDTH: usize = 20;

pub fn print_success(message: &str) {
    println!("{}", format!("✅ {}", message).bright_green().bold());
}

pub fn print_info(message: &str) {
    println!("{}", format!("ℹ️  {}", message).bright_cyan());
}

pub fn print_warning(message: &str) {
    println!("{}", format!("⚠️  {}", message).bright_yellow());
}

/// Horizontal bar for a traffic percentage, clamped to 0..=100
pub fn traffic_bar(percent: i64) -> String {
    let percent = percent.clamp(0, 100) as usize;
    let filled = (percent * BAR_WIDTH + 50) / 100;
    format!(
        "{}{}",
        "█".repeat(filled).bright_green(),
        "░".repeat(BAR_WIDTH - filled).dimmed()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_traffic_bar_width() {
        colored::control::set_override(false);
        assert_eq!(traffic_bar(0), "░".repeat(BAR_WIDTH));
        assert_eq!(traffic_bar(100), "█".repeat(BAR_WIDTH));
        assert_eq!(traffic_bar(50).chars().filter(|c| *c == '█').count(), 10);
        assert_eq!(traffic_bar(250), traffic_bar(100));
    }
}
