use colored::Colorize;

fn main() {
    if let Err(err) = evoledger::run() {
        eprintln!("{} {}", "error:".red().bold(), err);
        std::process::exit(1);
    }
}
