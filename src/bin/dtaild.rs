//! The dtail server: accepts sessions and serves `cat`/`grep`/`tail`/`map`
//! commands against the local filesystem.

use chrono::Utc;
use dtail::cancel::CancelToken;
use dtail::config;
use dtail::permission::AllowAll;
use dtail::pool::BufferPool;
use dtail::reader::admission::Admission;
use dtail::session::{SessionContext, SessionHandler};
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;

fn setup_logging(verbose: u64) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}] {}",
                Utc::now().to_rfc3339(),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stdout())
        .apply()
        .expect("could not set up logging");
}

fn main() {
    let config = config::parse_server_args();
    setup_logging(config.verbose);
    log::info!("dtaild - {}", config.version);

    let signal = chan_signal::notify(&[chan_signal::Signal::INT, chan_signal::Signal::TERM]);

    let listener = TcpListener::bind(&config.bind).unwrap_or_else(|e| {
        log::error!("failed to bind {}: {}", config.bind, e);
        std::process::exit(1);
    });
    log::info!("listening on {}", config.bind);

    let hostname = hostname();
    let cancel = CancelToken::new();
    let ctx = Arc::new(SessionContext {
        host: hostname,
        user: "dtaild".to_string(),
        oracle: Arc::new(AllowAll),
        cat_admission: Arc::new(Admission::new(config.admission_cat_limit)),
        tail_admission: Arc::new(Admission::new(config.admission_tail_limit)),
        pool: Arc::new(BufferPool::new()),
        max_line_length: config.max_line_length,
        cancel: cancel.clone(),
    });

    {
        let cancel = cancel.clone();
        thread::spawn(move || {
            signal.recv().unwrap();
            log::info!("shutdown signal received, cancelling active sessions");
            cancel.cancel();
        });
    }

    for incoming in listener.incoming() {
        let stream = match incoming {
            Ok(s) => s,
            Err(e) => {
                log::warn!("failed to accept connection: {}", e);
                continue;
            }
        };
        let ctx = Arc::clone(&ctx);
        thread::spawn(move || {
            SessionHandler::new(stream, ctx).run();
        });
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}
