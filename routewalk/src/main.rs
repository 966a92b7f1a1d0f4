use routewalk::commands::command_argument_builder;
use routewalk::handlers::{handle_classify, handle_crawl, init_tracing, print_banner};

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");

    // Show banner unless --quiet flag is set
    if !quiet {
        print_banner();
    }

    if chosen_command.subcommand().is_none() {
        return;
    }

    init_tracing();

    let code = match chosen_command.subcommand() {
        Some(("crawl", primary_command)) => handle_crawl(primary_command, quiet).await,
        Some(("classify", primary_command)) => handle_classify(primary_command),
        _ => unreachable!("clap should ensure we don't get here"),
    };
    std::process::exit(code);
}
