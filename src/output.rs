use colored::Colorize;

pub fn print_banner() {
    println!(
        "{}",
        concat!("screensweep v", env!("CARGO_PKG_VERSION"))
            .bold()
            .cyan()
    );
    println!();
}

pub fn print_scan_header(label: &str) {
    println!("{}", format!("=== {label} ===").bold().white());
}

pub fn print_scan_entry(path: &str, size: &str) {
    println!("  {}  {}", path.dimmed(), size.yellow());
}

pub fn print_match_total(count: usize, total: &str) {
    println!(
        "  {} {}",
        format!("{count} file(s), total:").bold(),
        total.green()
    );
    println!();
}

pub fn print_summary_row(label: &str, value: &str) {
    println!("  {:<20} {}", label, value.green());
}

pub fn print_warning(msg: &str) {
    println!("{} {}", "Warning:".red().bold(), msg.red());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "Error:".red().bold(), msg.red());
}

pub fn print_info(msg: &str) {
    println!("{} {}", "Info:".cyan().bold(), msg);
}

pub fn print_dry_run_footer() {
    println!(
        "{}",
        "This was a dry run. Run `screensweep clean --confirm` to move files."
            .yellow()
            .bold()
    );
}

pub fn print_no_confirm_warning() {
    println!(
        "{}",
        "No --confirm flag provided. Running as dry-run preview."
            .yellow()
            .bold()
    );
    println!();
}

pub fn print_clean_complete(cleaned: usize, skipped: usize, destination: &str) {
    println!(
        "{} {}",
        "Cleaned!".green().bold(),
        format!("{cleaned} moved to {destination}.").green()
    );
    if skipped > 0 {
        println!("  {}", format!("{skipped} skipped (busy or failed)").yellow());
    }
}

pub fn print_permission_hint() {
    println!(
        "{}",
        "Check folder permissions: System Settings → Privacy & Security → Files and Folders."
            .dimmed()
    );
}
