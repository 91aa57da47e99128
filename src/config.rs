//! CLI option parsing for both binaries, layered the way cernan's own
//! `config.rs` does: defaults first, an optional TOML config file overlaid
//! on top, then explicit CLI flags overlaid on that.

use clap::{App, Arg};
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

const VERSION: Option<&'static str> = option_env!("CARGO_PKG_VERSION");

fn default_version() -> String {
    VERSION.unwrap_or("unknown").to_string()
}

/// Server-side (`dtaild`) configuration.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub version: String,
    /// Address the server listens on, `host:port`.
    pub bind: String,
    /// Lines longer than this are truncated and flagged with a
    /// `LongLineWarning` rather than buffered without bound.
    pub max_line_length: usize,
    /// Whether `cat` commands use the pre-framed turbo output path.
    pub turbo_mode_enable: bool,
    /// Maximum concurrent one-shot (`cat`/`grep`/`map`) file reads.
    pub admission_cat_limit: usize,
    /// Maximum concurrent `tail -f` follows.
    pub admission_tail_limit: usize,
    /// Verbosity: 0 = warn, 1 = info, 2+ = debug.
    pub verbose: u64,
}

impl Default for ServerConfig {
    fn default() -> ServerConfig {
        ServerConfig {
            version: default_version(),
            bind: "0.0.0.0:2020".to_string(),
            max_line_length: 16 * 1024,
            turbo_mode_enable: true,
            admission_cat_limit: 32,
            admission_tail_limit: 128,
            verbose: 0,
        }
    }
}

/// Client-side (`dtail`) configuration.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub version: String,
    /// `host:port` targets to fan out to.
    pub servers: Vec<String>,
    /// Connect user, sent as part of permission checks server-side.
    pub user: String,
    /// Write results to this CSV file instead of the terminal.
    pub outfile: Option<PathBuf>,
    pub verbose: u64,
}

impl Default for ClientConfig {
    fn default() -> ClientConfig {
        ClientConfig {
            version: default_version(),
            servers: Vec::new(),
            user: whoami(),
            outfile: None,
            verbose: 0,
        }
    }
}

fn whoami() -> String {
    std::env::var("USER").unwrap_or_else(|_| "unknown".to_string())
}

fn read_config_file(path: &str) -> String {
    let mut fp = File::open(path).unwrap_or_else(|e| panic!("could not open config file {}: {}", path, e));
    let mut buffer = String::new();
    fp.read_to_string(&mut buffer)
        .unwrap_or_else(|e| panic!("could not read config file {}: {}", path, e));
    buffer
}

/// Parse `dtaild`'s CLI, optionally overlaying a TOML config file.
pub fn parse_server_args() -> ServerConfig {
    let matches = App::new("dtaild")
        .version(VERSION.unwrap_or("unknown"))
        .about("distributed log reading server")
        .arg(
            Arg::with_name("config-file")
                .long("config")
                .short("C")
                .value_name("config")
                .takes_value(true)
                .help("TOML config file to load."),
        )
        .arg(
            Arg::with_name("bind")
                .long("bind")
                .short("b")
                .takes_value(true)
                .help("Address to listen on, host:port."),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .help("Turn on verbose output."),
        )
        .get_matches();

    let mut config = match matches.value_of("config-file") {
        Some(path) => toml::from_str(&read_config_file(path)).unwrap_or_else(|e| panic!("bad config file {}: {}", path, e)),
        None => ServerConfig::default(),
    };
    if let Some(bind) = matches.value_of("bind") {
        config.bind = bind.to_string();
    }
    if matches.is_present("verbose") {
        config.verbose = matches.occurrences_of("verbose");
    }
    config
}

/// Parse `dtail`'s CLI, optionally overlaying a TOML config file. Returns
/// the parsed config alongside the raw `verb glob [pattern]` positional
/// arguments, which the binary turns into a [`crate::session::codec::Command`].
pub fn parse_client_args() -> (ClientConfig, Vec<String>) {
    let matches = App::new("dtail")
        .version(VERSION.unwrap_or("unknown"))
        .about("distributed log reading client")
        .arg(
            Arg::with_name("config-file")
                .long("config")
                .short("C")
                .value_name("config")
                .takes_value(true)
                .help("TOML config file to load."),
        )
        .arg(
            Arg::with_name("servers")
                .long("servers")
                .short("s")
                .takes_value(true)
                .use_delimiter(true)
                .help("Comma-separated list of host:port targets."),
        )
        .arg(
            Arg::with_name("outfile")
                .long("outfile")
                .short("o")
                .takes_value(true)
                .help("Write results as CSV to this path instead of the terminal."),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .help("Turn on verbose output."),
        )
        .arg(Arg::with_name("command").multiple(true).help("cat|grep|tail|map arguments."))
        .get_matches();

    let mut config: ClientConfig = match matches.value_of("config-file") {
        Some(path) => toml::from_str(&read_config_file(path)).unwrap_or_else(|e| panic!("bad config file {}: {}", path, e)),
        None => ClientConfig::default(),
    };
    if let Some(servers) = matches.values_of("servers") {
        config.servers = servers.map(str::to_string).collect();
    }
    if let Some(outfile) = matches.value_of("outfile") {
        config.outfile = Some(PathBuf::from(outfile));
    }
    if matches.is_present("verbose") {
        config.verbose = matches.occurrences_of("verbose");
    }
    let command = matches
        .values_of("command")
        .map(|vs| vs.map(str::to_string).collect())
        .unwrap_or_default();
    (config, command)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn server_config_defaults_are_sane() {
        let config = ServerConfig::default();
        assert_eq!(config.bind, "0.0.0.0:2020");
        assert!(config.turbo_mode_enable);
        assert!(config.admission_cat_limit > 0);
    }

    #[test]
    fn client_config_defaults_have_no_servers() {
        let config = ClientConfig::default();
        assert!(config.servers.is_empty());
        assert!(config.outfile.is_none());
    }

    #[test]
    fn server_config_overlays_toml_fields() {
        let toml_str = "bind = \"127.0.0.1:9000\"\nmax_line_length = 4096\n";
        let config: ServerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.bind, "127.0.0.1:9000");
        assert_eq!(config.max_line_length, 4096);
        // Fields absent from the file keep their defaults.
        assert!(config.turbo_mode_enable);
    }
}
