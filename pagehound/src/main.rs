use pagehound::commands::command_argument_builder;
use pagehound::handlers::handle_scan;
use pagehound_core::print_banner;

#[tokio::main]
async fn main() {
    let chosen_command = command_argument_builder().get_matches();
    let quiet = chosen_command.get_flag("quiet");

    if !quiet {
        print_banner();
    }

    match chosen_command.subcommand() {
        Some(("scan", primary_command)) => {
            if let Err(e) = handle_scan(primary_command, quiet).await {
                eprintln!("✗ {:#}", e);
                std::process::exit(1);
            }
        }
        None => {}
        _ => unreachable!("clap should ensure we don't get here"),
    }
}
