use colored::Colorize;

pub mod report;
pub mod request;
pub mod scan;

const BANNER: &str = r#"
                         __                          __
    ____  ____ _____ ____  / /_  ____  __  ______  ____/ /
   / __ \/ __ `/ __ `/ _ \/ __ \/ __ \/ / / / __ \/ __  /
  / /_/ / /_/ / /_/ /  __/ / / / /_/ / /_/ / / / / /_/ /
 / .___/\__,_/\__, /\___/_/ /_/\____/\__,_/_/ /_/\__,_/
/_/          /____/
"#;

pub fn print_banner() {
    println!("{}", BANNER.bright_magenta().bold());
    println!(
        "  {} {}\n",
        "front-end defect crawler".bright_white(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}
