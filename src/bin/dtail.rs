//! The dtail client: fans a `cat`/`grep`/`tail`/`map` command out to every
//! configured server and renders the merged result.

use chrono::Utc;
use dtail::client;
use dtail::config;
use dtail::query;
use dtail::regexspec::RegexSpec;
use dtail::session::codec::{Command, Options, Payload, Verb};
use std::process;

fn setup_logging(verbose: u64) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!("[{}][{}] {}", Utc::now().to_rfc3339(), record.level(), message))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply()
        .expect("could not set up logging");
}

fn main() {
    let (config, args) = config::parse_client_args();
    setup_logging(config.verbose);

    if config.servers.is_empty() {
        eprintln!("no servers configured; pass --servers host:port[,host:port...]");
        process::exit(1);
    }
    if args.len() < 2 {
        eprintln!("usage: dtail <cat|grep|tail|map> <glob> [pattern-or-query]");
        process::exit(1);
    }

    let verb = match Verb::from_cli(&args[0]) {
        Some(v) => v,
        None => {
            eprintln!("unknown command '{}'", args[0]);
            process::exit(1);
        }
    };
    let glob = args[1].clone();
    let tail_text = args[2..].join(" ");

    let payload = match verb {
        Verb::Cat => Payload::None,
        Verb::Grep | Verb::Tail => Payload::Regex(RegexSpec::detect(&tail_text)),
        Verb::Map => Payload::Query(tail_text.clone()),
        Verb::Ack | Verb::AckClose => Payload::None,
    };

    let cmd = Command {
        verb,
        options: Options::default(),
        glob,
        payload,
    };

    if verb == Verb::Map {
        let parsed = match query::parse(&tail_text) {
            Ok(q) => q,
            Err(e) => {
                eprintln!("bad query: {}", e);
                process::exit(1);
            }
        };
        let merger = client::run_map_command(config.servers.clone(), cmd, &parsed);
        let outfile_path = parsed
            .outfile
            .as_ref()
            .map(|o| std::path::PathBuf::from(&o.path))
            .or_else(|| config.outfile.clone());
        let append = parsed.outfile.as_ref().map(|o| o.append).unwrap_or(false);
        if let Err(e) = client::emit_result(
            &merger,
            &parsed.select,
            &parsed.group_by,
            parsed.order_by.as_deref(),
            parsed.reverse_order,
            parsed.limit,
            outfile_path.as_deref(),
            append,
        ) {
            eprintln!("failed to write results: {}", e);
            process::exit(1);
        }
    } else {
        client::run_line_command(config.servers.clone(), cmd);
    }
}
