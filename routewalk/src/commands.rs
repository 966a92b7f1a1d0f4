use crate::CLAP_STYLING;
use clap::builder::FalseyValueParser;
use clap::{ArgAction, arg, command};
use url::Url;

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("routewalk")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("routewalk")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .subcommand_required(false)
        .subcommand(
            command!("crawl")
                .about(
                    "Breadth-first crawl of a site's routes. Fails when any visited route \
                errors, returns >= 400 or never responds.",
                )
                .arg(
                    arg!(-u --"base-url" <URL>)
                        .required(false)
                        .help("Base URL of the site under test (repeatable)")
                        .value_parser(clap::value_parser!(Url))
                        .action(ArgAction::Append)
                        .env("ROUTEWALK_BASE_URL")
                        .default_value("http://127.0.0.1:8080"),
                )
                .arg(
                    arg!(-H --"hosts-file" <PATH>)
                        .required(false)
                        .help("Newline-delimited file of base URLs; takes precedence over --base-url")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(--"seed" <ROUTE>)
                        .required(false)
                        .help("Seed route, e.g. /modules (repeatable; replaces the built-in seeds)")
                        .action(ArgAction::Append),
                )
                .arg(
                    arg!(--"seeds-file" <PATH>)
                        .required(false)
                        .help("Newline-delimited file of seed routes")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(--"max-routes" <NUM>)
                        .required(false)
                        .help("Maximum number of routes to visit")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("200"),
                )
                .arg(
                    arg!(-c --"concurrency" <NUM>)
                        .required(false)
                        .help("Routes probed concurrently per batch")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("8"),
                )
                .arg(
                    arg!(--"max-variants" <NUM>)
                        .required(false)
                        .help("Maximum query-string variants visited per path")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("3"),
                )
                .arg(
                    arg!(--"category-cap" <CATEGORY_EQ_NUM>)
                        .required(false)
                        .help(
                            "Override a category quota, e.g. auth=4. Categories: search, \
                        module-detail, user-profile, collection, settings, auth, other",
                        )
                        .action(ArgAction::Append),
                )
                .arg(
                    arg!(--"default-category-cap" <NUM>)
                        .required(false)
                        .help("Quota for categories without their own cap")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("20"),
                )
                .arg(
                    arg!(--"ignore-prefix" <PREFIX>)
                        .required(false)
                        .help("Extra path prefix never crawled (repeatable)")
                        .action(ArgAction::Append),
                )
                .arg(
                    arg!(--"nav-timeout" <SECONDS>)
                        .required(false)
                        .help("Navigation timeout per request")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("5"),
                )
                .arg(
                    arg!(--"probe-timeout" <SECONDS>)
                        .required(false)
                        .help("Overall timeout per route")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("10"),
                )
                .arg(
                    arg!(--"run-timeout" <SECONDS>)
                        .required(false)
                        .help("Wall-clock limit for one crawl attempt")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("2700"),
                )
                .arg(
                    arg!(--"skip-web-server")
                        .required(false)
                        .help("Never start the dev server, even if --server-command is set")
                        .action(ArgAction::SetTrue)
                        .value_parser(FalseyValueParser::new())
                        .env("ROUTEWALK_SKIP_WEB_SERVER"),
                )
                .arg(
                    arg!(--"server-command" <CMD>)
                        .required(false)
                        .help("Shell command that serves the site at the base URL")
                        .env("ROUTEWALK_SERVER_COMMAND"),
                )
                .arg(
                    arg!(--"server-timeout" <SECONDS>)
                        .required(false)
                        .help("How long to wait for the dev server to answer")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("120"),
                )
                .arg(
                    arg!(--"ci")
                        .required(false)
                        .help("CI mode: retry failed crawls twice and crawl one site at a time")
                        .action(ArgAction::SetTrue)
                        .value_parser(FalseyValueParser::new())
                        .env("CI"),
                )
                .arg(
                    arg!(--"retries" <NUM>)
                        .required(false)
                        .help("Crawl attempts after a failed one (default: 2 in CI, else 0)")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(--"workers" <NUM>)
                        .required(false)
                        .help("Sites crawled in parallel (default: 1 in CI, else one per site)")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(-o --"output-dir" <DIR>)
                        .required(false)
                        .help("Write report attachments to this directory")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, json")
                        .value_parser(["text", "json"])
                        .default_value("text"),
                ),
        )
        .subcommand(
            command!("classify")
                .about("Show the base path, category and crawlability of routes")
                .arg(
                    arg!(<ROUTE> ...)
                        .required(true)
                        .help("Routes or hrefs to classify"),
                ),
        )
}
